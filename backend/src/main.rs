use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nitoagua_api::{
    app::build_router,
    config::Config,
    db,
    services::{encryption::parse_master_key, expiry, metrics},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    // Fail at boot rather than on the first document upload
    parse_master_key(&config.document_encryption_key)?;
    let config = Arc::new(config);

    let state = AppState::connect(config.clone()).await?;
    db::run_migrations(&state.db).await?;
    info!("Database connected and migrations applied");

    metrics::start(state.db.clone());
    expiry::start(state.clone());
    info!(
        "Offer expiry sweep every {}s",
        config.offer_sweep_interval_secs
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("nitoagua API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
