use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::roles::ConsumerUser,
    models::{
        auth::AuthenticatedUser,
        request::{CancelRequestBody, CreateRequestBody, RequestActor, RequestListQuery},
    },
    services::{offers::OfferService, profiles::ProfileService, requests::RequestService},
    AppState,
};

/// POST /requests: consumers and guests alike. Only the creator ever sees
/// the tracking token, in this response.
pub async fn create_request(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Json(body): Json<CreateRequestBody>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let profile = match &user {
        Some(u) => Some(
            ProfileService::get(&state.db, u.user_id)
                .await?
                .ok_or_else(|| AppError::forbidden("Completa tu perfil para continuar"))?,
        ),
        None => None,
    };

    let request = RequestService::create(&state, profile.as_ref(), &body).await?;
    let tracking_url = state.config.tracking_url(&request.tracking_token);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "tracking_token": &request.tracking_token,
            "tracking_url": tracking_url,
            "request": request,
        })),
    ))
}

pub async fn list_my_requests(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Query(query): Query<RequestListQuery>,
) -> AppResult<Json<Value>> {
    let requests = RequestService::list_for_consumer(&state.db, consumer.user_id, &query).await?;
    Ok(Json(json!({ "requests": requests })))
}

pub async fn get_request(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let actor = RequestActor::Consumer(consumer.user_id);
    let request = RequestService::get_for_actor(&state.db, id, &actor).await?;
    let detail = RequestService::detail(&state.db, request).await?;
    Ok(Json(serde_json::to_value(detail).map_err(anyhow::Error::from)?))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelRequestBody>,
) -> AppResult<Json<Value>> {
    let actor = RequestActor::Consumer(consumer.user_id);
    let request = RequestService::cancel(&state, id, &actor, body.reason.as_deref()).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

pub async fn list_request_offers(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let actor = RequestActor::Consumer(consumer.user_id);
    let request = RequestService::get_for_actor(&state.db, id, &actor).await?;
    let offers = OfferService::list_for_request(&state.db, request.id).await?;
    Ok(Json(json!({ "request_status": request.status, "offers": offers })))
}

pub async fn accept_offer(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(offer_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let actor = RequestActor::Consumer(consumer.user_id);
    let offer = OfferService::accept(&state, &actor, offer_id).await?;
    Ok(Json(json!({ "success": true, "offer": offer })))
}
