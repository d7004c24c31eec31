//! Guest access to a request through its tracking token.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::request::{CancelRequestBody, RequestActor},
    services::{offers::OfferService, requests::RequestService},
    AppState,
};

pub async fn get_tracked_request(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let request = RequestService::get_by_token(&state.db, &token).await?;
    let detail = RequestService::detail(&state.db, request).await?;
    Ok(Json(serde_json::to_value(detail).map_err(anyhow::Error::from)?))
}

pub async fn list_tracked_offers(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let request = RequestService::get_by_token(&state.db, &token).await?;
    let offers = OfferService::list_for_request(&state.db, request.id).await?;
    Ok(Json(json!({ "request_status": request.status, "offers": offers })))
}

pub async fn accept_tracked_offer(
    State(state): State<AppState>,
    Path((token, offer_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let request = RequestService::get_by_token(&state.db, &token).await?;
    let offer_request: Option<Uuid> = sqlx::query_scalar("SELECT request_id FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(&state.db)
        .await?;
    if offer_request != Some(request.id) {
        return Err(AppError::not_found("Oferta no encontrada"));
    }
    let offer = OfferService::accept(&state, &RequestActor::Guest(token), offer_id).await?;
    Ok(Json(json!({ "success": true, "offer": offer })))
}

pub async fn cancel_tracked_request(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<CancelRequestBody>,
) -> AppResult<Json<Value>> {
    let request = RequestService::get_by_token(&state.db, &token).await?;
    let cancelled = RequestService::cancel(
        &state,
        request.id,
        &RequestActor::Guest(token),
        body.reason.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "request": cancelled })))
}
