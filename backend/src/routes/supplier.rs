use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::roles::SupplierUser,
    models::{
        auth::AuthenticatedUser,
        offer::{CreateOfferRequest, OfferListQuery},
        profile::{
            BankInfo, SetAvailabilityRequest, SetServiceAreasRequest, SupplierOnboardingRequest,
            UpdateSupplierProfileRequest,
        },
    },
    services::{
        commission::CommissionService, deliveries::DeliveryService, documents::DocumentService,
        offers::OfferService, profiles::ProfileService, providers::ProviderService,
        requests::RequestService,
    },
    AppState,
};

// ─── Onboarding & profile ───────────────────────────────────────────────────

pub async fn onboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<SupplierOnboardingRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let profile =
        ProviderService::onboard(&state.db, user.user_id, user.email.as_deref(), &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "profile": profile }))))
}

pub async fn get_profile(
    State(state): State<AppState>,
    supplier: SupplierUser,
) -> AppResult<Json<Value>> {
    let service_areas = ProfileService::service_areas(&state.db, supplier.user_id).await?;
    let rating = ProfileService::rating_summary(&state.db, supplier.user_id).await?;
    let has_bank_info = supplier.profile.bank_info().is_some();
    Ok(Json(json!({
        "profile": supplier.profile,
        "service_areas": service_areas,
        "rating": rating,
        "has_bank_info": has_bank_info,
    })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Json(req): Json<UpdateSupplierProfileRequest>,
) -> AppResult<Json<Value>> {
    let profile = ProviderService::update_profile(&state.db, &supplier.profile, &req).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn set_availability(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Json(req): Json<SetAvailabilityRequest>,
) -> AppResult<Json<Value>> {
    let is_available = ProviderService::set_availability(
        &state.db,
        supplier.user_id,
        supplier.verification,
        req.is_available,
    )
    .await?;
    Ok(Json(json!({ "success": true, "is_available": is_available })))
}

pub async fn set_service_areas(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Json(req): Json<SetServiceAreasRequest>,
) -> AppResult<Json<Value>> {
    let areas = ProviderService::set_service_areas(&state.db, supplier.user_id, &req.comuna_ids).await?;
    Ok(Json(json!({ "success": true, "service_areas": areas })))
}

pub async fn set_bank(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Json(req): Json<BankInfo>,
) -> AppResult<Json<Value>> {
    ProviderService::set_bank(&state.db, supplier.user_id, &req).await?;
    Ok(Json(json!({ "success": true })))
}

// ─── Documents ──────────────────────────────────────────────────────────────

pub async fn upload_document(
    State(state): State<AppState>,
    supplier: SupplierUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let doc = DocumentService::upload(
        &state.db,
        &state.config,
        supplier.user_id,
        supplier.verification,
        multipart,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "document": doc }))))
}

pub async fn list_documents(
    State(state): State<AppState>,
    supplier: SupplierUser,
) -> AppResult<Json<Value>> {
    let docs = DocumentService::list(&state.db, supplier.user_id).await?;
    Ok(Json(json!({ "documents": docs })))
}

// ─── Requests & offers ──────────────────────────────────────────────────────

pub async fn list_open_requests(
    State(state): State<AppState>,
    supplier: SupplierUser,
) -> AppResult<Json<Value>> {
    supplier.require_approved()?;
    let requests = RequestService::open_for_supplier(&state.db, supplier.user_id).await?;
    Ok(Json(json!({ "requests": requests })))
}

pub async fn create_offer(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Path(request_id): Path<Uuid>,
    Json(req): Json<CreateOfferRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let offer = OfferService::create(&state, &supplier, request_id, &req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "offer": offer }))))
}

pub async fn list_my_offers(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Query(query): Query<OfferListQuery>,
) -> AppResult<Json<Value>> {
    let offers = OfferService::list_for_supplier(&state.db, supplier.user_id, &query).await?;
    Ok(Json(json!({ "offers": offers })))
}

pub async fn withdraw_offer(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Path(offer_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let offer = OfferService::withdraw(&state, supplier.user_id, offer_id).await?;
    Ok(Json(json!({ "success": true, "offer": offer })))
}

pub async fn complete_delivery(
    State(state): State<AppState>,
    supplier: SupplierUser,
    Path(offer_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let request = DeliveryService::complete(&state, supplier.user_id, offer_id).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

pub async fn earnings(
    State(state): State<AppState>,
    supplier: SupplierUser,
) -> AppResult<Json<Value>> {
    let summary = CommissionService::earnings_summary(&state.db, supplier.user_id).await?;
    let ledger = CommissionService::ledger(&state.db, Some(supplier.user_id)).await?;
    Ok(Json(json!({
        "summary": summary,
        "balance_due": summary.balance_due(),
        "net_earnings": summary.net_earnings(),
        "ledger": ledger,
    })))
}
