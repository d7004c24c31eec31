use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        profile::{
            ProfileRole, RegisterPushSubscriptionRequest, UnregisterPushSubscriptionRequest,
            UpsertConsumerProfileRequest,
        },
    },
    services::{notifications::NotificationService, profiles::ProfileService},
    AppState,
};

/// GET /me: the caller's profile (null before onboarding) and admin flag.
pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<Value>> {
    let profile = ProfileService::get(&state.db, user.user_id).await?;
    let is_admin = match user.email.as_deref() {
        Some(email) => ProfileService::is_admin_email(&state.db, email).await?,
        None => false,
    };
    let unread = match &profile {
        Some(_) => NotificationService::unread_count(&state.db, user.user_id).await?,
        None => 0,
    };
    let rating = match &profile {
        Some(p) if p.role() == Some(ProfileRole::Supplier) => {
            Some(ProfileService::rating_summary(&state.db, p.id).await?)
        }
        _ => None,
    };
    Ok(Json(json!({
        "user_id": user.user_id,
        "email": user.email,
        "profile": profile,
        "is_admin": is_admin,
        "unread_notifications": unread,
        "rating": rating,
    })))
}

/// PUT /me: create or update the consumer profile.
pub async fn upsert_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<UpsertConsumerProfileRequest>,
) -> AppResult<Json<Value>> {
    let profile =
        ProfileService::upsert_consumer(&state.db, user.user_id, user.email.as_deref(), &req).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn register_push_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<RegisterPushSubscriptionRequest>,
) -> AppResult<Json<Value>> {
    if !req.endpoint.starts_with("https://") {
        return Err(AppError::bad_request("Suscripción inválida"));
    }
    if ProfileService::get(&state.db, user.user_id).await?.is_none() {
        return Err(AppError::forbidden("Completa tu perfil para continuar"));
    }
    NotificationService::register_push_subscription(
        &state.db,
        user.user_id,
        &req.endpoint,
        &req.p256dh,
        &req.auth,
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn unregister_push_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<UnregisterPushSubscriptionRequest>,
) -> AppResult<Json<Value>> {
    NotificationService::unregister_push_subscription(&state.db, user.user_id, &req.endpoint)
        .await?;
    Ok(Json(json!({ "success": true })))
}
