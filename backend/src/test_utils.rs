//! Row fixtures for database-backed tests.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    middleware::roles::SupplierUser,
    models::{offer::Offer, profile::VerificationStatus, request::WaterRequest},
    services::{profiles::ProfileService, requests::new_tracking_token},
};

pub const COMUNA: &str = "villarrica";

pub async fn create_consumer(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO profiles (id, role, full_name, phone, email, address, comuna_id)
         VALUES ($1, 'consumer', 'María Soto', '+56911111111', 'maria@example.cl', 'Camino Real 123', $2)",
    )
    .bind(id)
    .bind(COMUNA)
    .execute(pool)
    .await
    .unwrap();
    id
}

/// Available supplier serving [`COMUNA`], priced 5.000 / 20.000 / 60.000 / 100.000 CLP.
pub async fn create_supplier(pool: &PgPool, status: VerificationStatus) -> SupplierUser {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO profiles
         (id, role, full_name, phone, verification_status, is_available,
          price_100l, price_1000l, price_5000l, price_10000l, vehicle_type, vehicle_capacity)
         VALUES ($1, 'supplier', 'Aguas del Sur', '+56922222222', $2, TRUE,
                 5000, 20000, 60000, 100000, 'camion', 10000)",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO provider_service_areas (provider_id, comuna_id) VALUES ($1, $2)")
        .bind(id)
        .bind(COMUNA)
        .execute(pool)
        .await
        .unwrap();

    let profile = ProfileService::get(pool, id).await.unwrap().unwrap();
    SupplierUser {
        user_id: id,
        profile,
        verification: status,
    }
}

/// Pending request for 1000 L in [`COMUNA`]; guest-owned when `consumer_id` is `None`.
pub async fn create_request(pool: &PgPool, consumer_id: Option<Uuid>, is_urgent: bool) -> WaterRequest {
    let (guest_name, guest_phone, guest_email) = match consumer_id {
        Some(_) => (None, None, None),
        None => (
            Some("Pedro Rojas"),
            Some("+56933333333"),
            Some("pedro@example.cl"),
        ),
    };
    sqlx::query_as::<_, WaterRequest>(
        "INSERT INTO water_requests
         (consumer_id, guest_name, guest_phone, guest_email, address, comuna_id, amount, is_urgent, tracking_token)
         VALUES ($1, $2, $3, $4, 'Camino Real 123', $5, 1000, $6, $7)
         RETURNING *",
    )
    .bind(consumer_id)
    .bind(guest_name)
    .bind(guest_phone)
    .bind(guest_email)
    .bind(COMUNA)
    .bind(is_urgent)
    .bind(new_tracking_token())
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Moves a request's creation time `hours` into the past.
pub async fn age_request(pool: &PgPool, request_id: Uuid, hours: i32) {
    sqlx::query("UPDATE water_requests SET created_at = NOW() - make_interval(hours => $2) WHERE id = $1")
        .bind(request_id)
        .bind(hours)
        .execute(pool)
        .await
        .unwrap();
}

/// Active offer expiring `expires_in_minutes` from now (negative for lapsed).
pub async fn create_offer(
    pool: &PgPool,
    request_id: Uuid,
    provider_id: Uuid,
    price: i32,
    expires_in_minutes: i64,
) -> Offer {
    let now = Utc::now();
    sqlx::query_as::<_, Offer>(
        "INSERT INTO offers
         (request_id, provider_id, price, delivery_window_start, delivery_window_end, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(request_id)
    .bind(provider_id)
    .bind(price)
    .bind(now + Duration::hours(2))
    .bind(now + Duration::hours(4))
    .bind(now + Duration::minutes(expires_in_minutes))
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn offer_status(pool: &PgPool, offer_id: Uuid) -> String {
    sqlx::query_scalar("SELECT status FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn reload_request(pool: &PgPool, request_id: Uuid) -> WaterRequest {
    sqlx::query_as::<_, WaterRequest>("SELECT * FROM water_requests WHERE id = $1")
        .bind(request_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Marks a request delivered by `provider_id`, `hours_ago` hours back.
pub async fn mark_delivered(pool: &PgPool, request_id: Uuid, provider_id: Uuid, hours_ago: i32) {
    sqlx::query(
        "UPDATE water_requests
         SET status = 'delivered', supplier_id = $2, accepted_at = NOW(),
             delivered_at = NOW() - make_interval(hours => $3)
         WHERE id = $1",
    )
    .bind(request_id)
    .bind(provider_id)
    .bind(hours_ago)
    .execute(pool)
    .await
    .unwrap();
}
