pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;

use config::Config;
use services::email::EmailService;
use services::notifications::NotificationService;
use services::push::VapidSigner;

/// Application state shared across all handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: redis::aio::MultiplexedConnection,
    pub redis_client: RedisClient,
    pub config: Arc<Config>,
    pub notifications: Arc<NotificationService>,
    pub email: Option<Arc<EmailService>>,
}

impl AppState {
    /// Connects Postgres and Redis and wires the notification channels.
    /// Migrations are left to the caller.
    pub async fn connect(config: Arc<Config>) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.database_url).await?;

        let redis_client = RedisClient::open(config.redis_url.as_str())?;
        let redis_conn = redis_client.get_multiplexed_async_connection().await?;
        info!("Redis connected");

        let vapid = VapidSigner::from_config(&config)?;
        if vapid.is_some() {
            info!("Web Push (VAPID) configured");
        } else {
            info!("VAPID not configured, push notifications disabled");
        }
        let notifications = Arc::new(NotificationService::new(redis_conn.clone(), vapid)?);

        let email = EmailService::new(&config).map(Arc::new);
        if email.is_some() {
            info!("SMTP email service configured");
        } else {
            info!("SMTP not configured, guest emails disabled");
        }

        Ok(Self {
            db: pool,
            redis: redis_conn,
            redis_client,
            config,
            notifications,
            email,
        })
    }
}
