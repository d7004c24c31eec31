use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{auth::AuthenticatedUser, notification::NotificationListQuery},
    services::notifications::NotificationService,
    AppState,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationListQuery>,
) -> AppResult<Json<Value>> {
    let notifications = NotificationService::list(&state.db, user.user_id, &query).await?;
    let unread = NotificationService::unread_count(&state.db, user.user_id).await?;
    Ok(Json(json!({ "notifications": notifications, "unread": unread })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !NotificationService::mark_read(&state.db, user.user_id, id).await? {
        return Err(AppError::not_found("Notificación no encontrada"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    let updated = NotificationService::mark_all_read(&state.db, user.user_id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
