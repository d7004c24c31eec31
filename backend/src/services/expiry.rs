use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        notification::{NewNotification, NotificationKind, RealtimeEvent},
        request::WaterRequest,
    },
    services::{metrics, realtime, settings::SettingsService},
    AppState,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub offers_expired: usize,
    pub requests_closed: usize,
}

/// Spawn the background sweep, running every `offer_sweep_interval_secs`.
pub fn start(state: AppState) {
    let every = state.config.offer_sweep_interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(every));
        loop {
            interval.tick().await;
            match sweep(&state).await {
                Ok(report) if report != SweepReport::default() => info!(
                    "Expiry sweep: {} offer(s) expired, {} request(s) without offers",
                    report.offers_expired, report.requests_closed
                ),
                Ok(_) => {}
                Err(e) => warn!("Expiry sweep failed: {}", e),
            }
        }
    });
}

/// One pass: expire lapsed offers, then close stale pending requests.
pub async fn sweep(state: &AppState) -> AppResult<SweepReport> {
    let offers_expired = expire_offers(state).await?;
    let requests_closed = close_unanswered_requests(state).await?;
    Ok(SweepReport {
        offers_expired,
        requests_closed,
    })
}

/// Marks lapsed active offers `expired`; returns `(offer, request, provider)` ids.
pub(crate) async fn expire_lapsed_offers(pool: &PgPool) -> AppResult<Vec<(Uuid, Uuid, Uuid)>> {
    let expired = sqlx::query_as(
        "UPDATE offers SET status = 'expired', updated_at = NOW()
         WHERE status = 'active' AND expires_at <= NOW()
         RETURNING id, request_id, provider_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(expired)
}

/// Start of the window a pending request may wait for offers.
pub(crate) fn request_cutoff(now: DateTime<Utc>, timeout_hours: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_hours(timeout_hours)
        .and_then(|t| now.checked_sub_signed(t))
        .ok_or_else(|| anyhow::anyhow!("Request timeout out of range: {timeout_hours} h").into())
}

/// Closes pending requests created before `cutoff` that hold no active offer.
///
/// Candidates are locked first, skipping rows an offer insert is holding, and
/// the offer check is repeated by the update under a fresh snapshot, so an
/// offer committed while the sweep waited keeps its request open.
pub(crate) async fn close_stale_requests(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> AppResult<Vec<WaterRequest>> {
    let mut tx = pool.begin().await?;
    let candidates: Vec<Uuid> = sqlx::query_scalar(
        "SELECT r.id FROM water_requests r
         WHERE r.status = 'pending' AND r.created_at <= $1
           AND NOT EXISTS (
               SELECT 1 FROM offers o WHERE o.request_id = r.id AND o.status = 'active'
           )
         FOR UPDATE SKIP LOCKED",
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let closed = sqlx::query_as::<_, WaterRequest>(
        "UPDATE water_requests r SET status = 'no_offers', updated_at = NOW()
         WHERE r.id = ANY($1) AND r.status = 'pending'
           AND NOT EXISTS (
               SELECT 1 FROM offers o WHERE o.request_id = r.id AND o.status = 'active'
           )
         RETURNING r.*",
    )
    .bind(&candidates)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(closed)
}

async fn expire_offers(state: &AppState) -> AppResult<usize> {
    let expired = expire_lapsed_offers(&state.db).await?;

    let mut redis = state.redis.clone();
    for (offer_id, request_id, provider_id) in &expired {
        metrics::OFFERS_EXPIRED.inc();
        state
            .notifications
            .notify(
                &state.db,
                *provider_id,
                NewNotification::new(
                    NotificationKind::OfferExpired,
                    "Oferta expirada",
                    "Tu oferta expiró sin ser aceptada",
                )
                .with_data(json!({ "request_id": request_id, "offer_id": offer_id })),
            )
            .await;
        realtime::publish(
            &mut redis,
            &realtime::request_channel(*request_id),
            &RealtimeEvent::new(
                "offer_expired",
                json!({ "request_id": request_id, "offer_id": offer_id }),
            ),
        )
        .await;
    }
    Ok(expired.len())
}

async fn close_unanswered_requests(state: &AppState) -> AppResult<usize> {
    let settings = SettingsService::load(&state.db).await?;
    let cutoff = request_cutoff(Utc::now(), settings.request_timeout_hours)?;
    let closed = close_stale_requests(&state.db, cutoff).await?;

    let mut redis = state.redis.clone();
    for request in &closed {
        match request.consumer_id {
            Some(consumer_id) => {
                state
                    .notifications
                    .notify(
                        &state.db,
                        consumer_id,
                        NewNotification::new(
                            NotificationKind::NoOffers,
                            "Sin ofertas",
                            "Ningún aguatero respondió a tu solicitud a tiempo",
                        )
                        .with_data(json!({ "request_id": request.id })),
                    )
                    .await;
            }
            None => {
                if let (Some(email), Some(to)) = (&state.email, request.guest_email.as_deref()) {
                    let name = request.guest_name.as_deref().unwrap_or("vecino");
                    let url = state.config.tracking_url(&request.tracking_token);
                    let sent = email.send_no_offers(to, name, &url).await;
                    metrics::record_notification("email", sent.is_ok());
                    if let Err(e) = sent {
                        warn!("Request {}: no-offers email failed: {}", request.id, e);
                    }
                }
            }
        }
        realtime::publish(
            &mut redis,
            &realtime::request_channel(request.id),
            &RealtimeEvent::new("request_no_offers", json!({ "request_id": request.id })),
        )
        .await;
    }
    Ok(closed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::profile::VerificationStatus, test_utils::*};

    #[test]
    fn cutoff_is_timeout_hours_ago() {
        let now = Utc::now();
        assert_eq!(request_cutoff(now, 4).unwrap(), now - Duration::hours(4));
    }

    #[test]
    fn oversized_timeout_is_an_error_not_a_panic() {
        assert!(request_cutoff(Utc::now(), 10_000_000_000_000).is_err());
        assert!(request_cutoff(Utc::now(), i64::MAX).is_err());
    }

    #[sqlx::test]
    async fn lapsed_offers_expire_and_live_ones_stay(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let other = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let lapsed = create_offer(&pool, request.id, supplier.user_id, 20_000, -5).await;
        let live = create_offer(&pool, request.id, other.user_id, 21_000, 30).await;

        let expired = expire_lapsed_offers(&pool).await.unwrap();

        assert_eq!(expired, vec![(lapsed.id, request.id, supplier.user_id)]);
        assert_eq!(offer_status(&pool, lapsed.id).await, "expired");
        assert_eq!(offer_status(&pool, live.id).await, "active");
        assert!(expire_lapsed_offers(&pool).await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn stale_requests_without_offers_close(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;

        let stale = create_request(&pool, Some(consumer), false).await;
        age_request(&pool, stale.id, 5).await;
        let answered = create_request(&pool, Some(consumer), false).await;
        age_request(&pool, answered.id, 5).await;
        create_offer(&pool, answered.id, supplier.user_id, 20_000, 30).await;
        let fresh = create_request(&pool, None, false).await;

        let cutoff = request_cutoff(Utc::now(), 4).unwrap();
        let closed = close_stale_requests(&pool, cutoff).await.unwrap();

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, stale.id);
        assert_eq!(closed[0].status, "no_offers");
        assert_eq!(reload_request(&pool, answered.id).await.status, "pending");
        assert_eq!(reload_request(&pool, fresh.id).await.status, "pending");
    }

    #[sqlx::test]
    async fn request_locked_by_an_offer_insert_is_skipped(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let request = create_request(&pool, Some(consumer), false).await;
        age_request(&pool, request.id, 5).await;

        let mut holder = pool.begin().await.unwrap();
        sqlx::query("SELECT id FROM water_requests WHERE id = $1 FOR UPDATE")
            .bind(request.id)
            .execute(&mut *holder)
            .await
            .unwrap();

        let cutoff = request_cutoff(Utc::now(), 4).unwrap();
        assert!(close_stale_requests(&pool, cutoff).await.unwrap().is_empty());
        holder.rollback().await.unwrap();

        assert_eq!(close_stale_requests(&pool, cutoff).await.unwrap().len(), 1);
    }
}
