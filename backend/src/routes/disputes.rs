use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::roles::{AdminUser, ConsumerUser},
    models::{
        dispute::{CreateDisputeRequest, DisputeListQuery, ResolveDisputeRequest},
        request::RequestActor,
    },
    services::{disputes::DisputeService, requests::RequestService},
    AppState,
};

pub async fn file_dispute(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(request_id): Path<Uuid>,
    Json(req): Json<CreateDisputeRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let dispute = DisputeService::file(&state, consumer.user_id, request_id, &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "dispute": dispute }))))
}

pub async fn get_dispute(
    State(state): State<AppState>,
    consumer: ConsumerUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let actor = RequestActor::Consumer(consumer.user_id);
    let request = RequestService::get_for_actor(&state.db, request_id, &actor).await?;
    let dispute = DisputeService::for_request(&state.db, request.id).await?;
    Ok(Json(json!({ "dispute": dispute })))
}

// ─── Admin ──────────────────────────────────────────────────────────────────

pub async fn admin_list_disputes(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<DisputeListQuery>,
) -> AppResult<Json<Value>> {
    let disputes = DisputeService::list(&state.db, query.status.as_deref()).await?;
    Ok(Json(json!({ "disputes": disputes })))
}

pub async fn admin_review_dispute(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let dispute = DisputeService::mark_under_review(&state, id, &admin.email).await?;
    Ok(Json(json!({ "success": true, "dispute": dispute })))
}

pub async fn admin_resolve_dispute(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveDisputeRequest>,
) -> AppResult<Json<Value>> {
    let dispute = DisputeService::resolve(&state, id, &req, &admin.email).await?;
    Ok(Json(json!({ "success": true, "dispute": dispute })))
}
