use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::roles::ConsumerUser,
    models::rating::SubmitRatingRequest,
    services::ratings::RatingService,
    AppState,
};

pub async fn submit_rating(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(request_id): Path<Uuid>,
    Json(req): Json<SubmitRatingRequest>,
) -> AppResult<Json<Value>> {
    let rating = RatingService::submit(&state.db, consumer.user_id, request_id, &req).await?;
    Ok(Json(json!({ "success": true, "rating": rating })))
}

pub async fn get_rating(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let rating = RatingService::for_request(&state.db, consumer.user_id, request_id).await?;
    Ok(Json(json!({ "rating": rating })))
}
