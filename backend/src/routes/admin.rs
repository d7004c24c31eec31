use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::roles::AdminUser,
    models::{
        admin::{
            AddAllowedEmailRequest, CommissionOverrideRequest, OrdersQuery, ProviderDirectoryQuery,
            ProviderStatusRequest, VerifyProviderRequest,
        },
        commission::{LedgerEntryType, RecordPaymentRequest},
        settings::UpdateSettingsRequest,
    },
    services::{
        admin::AdminService,
        commission::{ledger_csv, CommissionService},
        documents::DocumentService,
        settings::SettingsService,
    },
    AppState,
};

// ─── Verification ───────────────────────────────────────────────────────────

pub async fn verification_queue(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Value>> {
    let providers = AdminService::verification_queue(&state.db).await?;
    Ok(Json(json!({ "providers": providers })))
}

pub async fn verify_provider(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyProviderRequest>,
) -> AppResult<Json<Value>> {
    let profile =
        AdminService::decide(&state, id, req.decision, req.reason.as_deref(), &admin.email).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

// ─── Provider directory ─────────────────────────────────────────────────────

pub async fn list_providers(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ProviderDirectoryQuery>,
) -> AppResult<Json<Value>> {
    let providers = AdminService::directory(&state.db, &query).await?;
    Ok(Json(json!({ "providers": providers })))
}

pub async fn get_provider(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let detail = AdminService::detail(&state.db, id).await?;
    Ok(Json(serde_json::to_value(detail).map_err(anyhow::Error::from)?))
}

pub async fn set_provider_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ProviderStatusRequest>,
) -> AppResult<Json<Value>> {
    let profile =
        AdminService::set_status(&state, id, req.action, req.reason.as_deref(), &admin.email).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn set_commission_override(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CommissionOverrideRequest>,
) -> AppResult<Json<Value>> {
    let profile =
        AdminService::set_commission_override(&state.db, id, req.commission_percent, &admin.email)
            .await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

/// Decrypted verification document, streamed back with its original type.
pub async fn download_document(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((provider_id, document_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let (doc, bytes) =
        DocumentService::read(&state.db, &state.config, provider_id, document_id).await?;
    let disposition = format!(
        "inline; filename=\"{}\"",
        doc.original_filename.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, doc.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

// ─── Commissions ────────────────────────────────────────────────────────────

pub async fn record_payment(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordPaymentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let entry = CommissionService::record_entry(
        &state.db,
        id,
        LedgerEntryType::CommissionPaid,
        &req,
        &admin.email,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "entry": entry }))))
}

pub async fn record_adjustment(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordPaymentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let entry =
        CommissionService::record_entry(&state.db, id, LedgerEntryType::Adjustment, &req, &admin.email)
            .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "entry": entry }))))
}

pub async fn commission_balances(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Value>> {
    let balances = CommissionService::provider_balances(&state.db).await?;
    let total_due: i64 = balances.iter().map(|b| b.balance_due).sum();
    Ok(Json(json!({ "balances": balances, "total_due": total_due })))
}

#[derive(Debug, Deserialize)]
pub struct LedgerExportQuery {
    pub provider_id: Option<Uuid>,
}

pub async fn export_ledger_csv(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<LedgerExportQuery>,
) -> AppResult<impl IntoResponse> {
    let entries = CommissionService::ledger(&state.db, query.provider_id).await?;
    let csv = ledger_csv(&entries)?;
    tracing::info!("Ledger export ({} rows) by {}", entries.len(), admin.email);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"comisiones.csv\""),
        ],
        csv,
    ))
}

// ─── Settings ───────────────────────────────────────────────────────────────

pub async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Value>> {
    let settings = SettingsService::load(&state.db).await?;
    Ok(Json(json!({ "settings": settings })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> AppResult<Json<Value>> {
    let settings = SettingsService::update(&state.db, &req, &admin.email).await?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

// ─── Admin allowlist ────────────────────────────────────────────────────────

pub async fn list_allowed_emails(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Value>> {
    let emails = AdminService::allowed_emails(&state.db).await?;
    Ok(Json(json!({ "emails": emails })))
}

pub async fn add_allowed_email(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<AddAllowedEmailRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let row = AdminService::add_allowed_email(&state.db, &req.email, &admin.email).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "email": row }))))
}

pub async fn remove_allowed_email(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(email): Path<String>,
) -> AppResult<Json<Value>> {
    AdminService::remove_allowed_email(&state.db, &email, &admin.email).await?;
    Ok(Json(json!({ "success": true })))
}

// ─── Orders ─────────────────────────────────────────────────────────────────

pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<OrdersQuery>,
) -> AppResult<Json<Value>> {
    let orders = AdminService::orders(&state.db, &query).await?;
    Ok(Json(json!({ "orders": orders })))
}
