/// Operational tasks run outside the API process.
///
/// Usage:
///   nitoagua-ops expire-offers
///   nitoagua-ops grant-admin EMAIL
///   nitoagua-ops revoke-admin EMAIL
use std::sync::Arc;

use clap::{Parser, Subcommand};

use nitoagua_api::{
    config::Config,
    db,
    services::{admin::AdminService, expiry},
    AppState,
};

#[derive(Parser)]
#[command(name = "nitoagua-ops", about = "Maintenance commands for the nitoagua database")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one expiry sweep now (lapsed offers, unanswered requests)
    ExpireOffers,
    /// Add an email to the admin allowlist
    GrantAdmin { email: String },
    /// Remove an email from the admin allowlist
    RevokeAdmin { email: String },
}

const OPS_ACTOR: &str = "nitoagua-ops";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = Arc::new(Config::from_env()?);

    match args.command {
        Command::ExpireOffers => {
            let state = AppState::connect(config).await?;
            db::run_migrations(&state.db).await?;
            let report = expiry::sweep(&state).await?;
            tracing::info!(
                "Sweep done: {} offer(s) expired, {} request(s) closed without offers",
                report.offers_expired,
                report.requests_closed
            );
        }
        Command::GrantAdmin { email } => {
            let pool = db::create_pool(&config.database_url).await?;
            let row = AdminService::add_allowed_email(&pool, &email, OPS_ACTOR).await?;
            tracing::info!("{} can now access the admin panel", row.email);
        }
        Command::RevokeAdmin { email } => {
            let pool = db::create_pool(&config.database_url).await?;
            AdminService::remove_allowed_email(&pool, &email, OPS_ACTOR).await?;
        }
    }

    Ok(())
}
