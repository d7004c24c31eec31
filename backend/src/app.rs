use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{middleware::auth::JwtSecret, models::document::MAX_DOCUMENT_BYTES, routes, AppState};

/// Allows the web app origin, plus localhost for development.
fn cors_layer(app_base_url: &str) -> CorsLayer {
    let base = app_base_url.trim_end_matches('/').to_string();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin)
}

pub fn build_router(state: AppState) -> Router {
    let jwt_secret = JwtSecret {
        secret: state.config.jwt_secret.clone(),
        audience: state.config.jwt_audience.clone(),
    };
    let cors = cors_layer(&state.config.app_base_url);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .route("/comunas", get(routes::comunas::list_comunas))
        // Profile
        .route("/me", get(routes::profile::me).put(routes::profile::upsert_profile))
        .route(
            "/me/push-subscriptions",
            post(routes::profile::register_push_subscription)
                .delete(routes::profile::unregister_push_subscription),
        )
        // Notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/read-all", post(routes::notifications::mark_all_read))
        .route("/notifications/{id}/read", post(routes::notifications::mark_read))
        // Consumer requests
        .route(
            "/requests",
            get(routes::requests::list_my_requests).post(routes::requests::create_request),
        )
        .route("/requests/{id}", get(routes::requests::get_request))
        .route("/requests/{id}/cancel", post(routes::requests::cancel_request))
        .route("/requests/{id}/offers", get(routes::requests::list_request_offers))
        .route(
            "/requests/{id}/rating",
            get(routes::ratings::get_rating).post(routes::ratings::submit_rating),
        )
        .route(
            "/requests/{id}/dispute",
            get(routes::disputes::get_dispute).post(routes::disputes::file_dispute),
        )
        .route("/offers/{id}/accept", post(routes::requests::accept_offer))
        // Guest tracking
        .route("/track/{token}", get(routes::tracking::get_tracked_request))
        .route("/track/{token}/offers", get(routes::tracking::list_tracked_offers))
        .route(
            "/track/{token}/offers/{offer_id}/accept",
            post(routes::tracking::accept_tracked_offer),
        )
        .route("/track/{token}/cancel", post(routes::tracking::cancel_tracked_request))
        // Supplier
        .route("/supplier/onboarding", post(routes::supplier::onboard))
        .route(
            "/supplier/profile",
            get(routes::supplier::get_profile).put(routes::supplier::update_profile),
        )
        .route("/supplier/availability", put(routes::supplier::set_availability))
        .route("/supplier/service-areas", put(routes::supplier::set_service_areas))
        .route("/supplier/bank", put(routes::supplier::set_bank))
        .route(
            "/supplier/documents",
            get(routes::supplier::list_documents).post(routes::supplier::upload_document),
        )
        .route("/supplier/requests", get(routes::supplier::list_open_requests))
        .route("/supplier/requests/{id}/offers", post(routes::supplier::create_offer))
        .route("/supplier/offers", get(routes::supplier::list_my_offers))
        .route("/supplier/offers/{id}/withdraw", post(routes::supplier::withdraw_offer))
        .route("/supplier/offers/{id}/complete", post(routes::supplier::complete_delivery))
        .route("/supplier/earnings", get(routes::supplier::earnings))
        // Admin
        .route("/admin/verification-queue", get(routes::admin::verification_queue))
        .route("/admin/providers", get(routes::admin::list_providers))
        .route("/admin/providers/{id}", get(routes::admin::get_provider))
        .route("/admin/providers/{id}/verify", post(routes::admin::verify_provider))
        .route("/admin/providers/{id}/status", post(routes::admin::set_provider_status))
        .route("/admin/providers/{id}/commission", put(routes::admin::set_commission_override))
        .route("/admin/providers/{id}/payments", post(routes::admin::record_payment))
        .route("/admin/providers/{id}/adjustments", post(routes::admin::record_adjustment))
        .route(
            "/admin/providers/{id}/documents/{document_id}",
            get(routes::admin::download_document),
        )
        .route("/admin/commissions", get(routes::admin::commission_balances))
        .route("/admin/commissions/export.csv", get(routes::admin::export_ledger_csv))
        .route("/admin/disputes", get(routes::disputes::admin_list_disputes))
        .route("/admin/disputes/{id}/review", post(routes::disputes::admin_review_dispute))
        .route("/admin/disputes/{id}/resolve", post(routes::disputes::admin_resolve_dispute))
        .route(
            "/admin/settings",
            get(routes::admin::get_settings).put(routes::admin::update_settings),
        )
        .route(
            "/admin/allowed-emails",
            get(routes::admin::list_allowed_emails).post(routes::admin::add_allowed_email),
        )
        .route(
            "/admin/allowed-emails/{email}",
            axum::routing::delete(routes::admin::remove_allowed_email),
        )
        .route("/admin/orders", get(routes::admin::list_orders))
        // Realtime
        .route("/ws", get(routes::websocket::ws_handler))
        .route("/ws/track/{token}", get(routes::websocket::ws_track_handler))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Room for a document plus multipart framing
        .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES + 1024 * 1024))
        .with_state(state)
}
