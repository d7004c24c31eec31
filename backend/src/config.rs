use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    pub documents_dir: String,
    /// 32-byte master key, hex encoded
    pub document_encryption_key: String,
    pub offer_sweep_interval_secs: u64,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    // Web Push (optional)
    pub vapid_private_key_pem: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("SUPABASE_JWT_SECRET")?,
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            documents_dir: env::var("DOCUMENTS_DIR")
                .unwrap_or_else(|_| "/data/documents".into()),
            document_encryption_key: required("DOCUMENT_ENCRYPTION_KEY")?,
            offer_sweep_interval_secs: env::var("OFFER_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            smtp_host: optional("SMTP_HOST"),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: optional("SMTP_USERNAME"),
            smtp_password: optional("SMTP_PASSWORD"),
            smtp_from: optional("SMTP_FROM"),
            vapid_private_key_pem: optional("VAPID_PRIVATE_KEY_PEM"),
            vapid_public_key: optional("VAPID_PUBLIC_KEY"),
            vapid_subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:soporte@nitoagua.cl".into()),
        })
    }

    /// Public link a guest uses to follow a request.
    pub fn tracking_url(&self, tracking_token: &str) -> String {
        format!(
            "{}/track/{}",
            self.app_base_url.trim_end_matches('/'),
            tracking_token
        )
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}
