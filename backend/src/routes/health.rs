use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness plus dependency check. Redis is reported but only the database
/// decides the status code: realtime is best effort.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut redis = state.redis.clone();
    let pong: Result<String, _> = redis::cmd("PING").query_async(&mut redis).await;
    let redis_ok = pong.is_ok();

    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected", "redis": redis_ok })),
        ),
        Err(e) => {
            tracing::error!("Health check: database unreachable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": "unreachable", "redis": redis_ok })),
            )
        }
    }
}
