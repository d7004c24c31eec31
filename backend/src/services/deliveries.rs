use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        commission::{compute_commission, LedgerEntry},
        notification::{NewNotification, NotificationKind, RealtimeEvent},
        offer::{Offer, OfferStatus},
        request::{RequestStatus, WaterRequest},
        settings::PlatformSettings,
    },
    services::{metrics, realtime, requests::lock_request, settings::SettingsService},
    AppState,
};

pub struct DeliveryService;

impl DeliveryService {
    /// Marks the accepted offer's request as delivered and books the
    /// commission the supplier owes on it.
    pub async fn complete(state: &AppState, provider_id: Uuid, offer_id: Uuid) -> AppResult<WaterRequest> {
        let settings = SettingsService::load(&state.db).await?;
        let (delivered, commission) =
            Self::record_delivery(&state.db, &settings, provider_id, offer_id).await?;
        let request_id = delivered.id;

        metrics::DELIVERIES_COMPLETED.inc();
        tracing::info!(
            "Request {} delivered by {}; commission {} CLP",
            request_id,
            provider_id,
            commission.amount
        );

        match delivered.consumer_id {
            Some(consumer_id) => {
                state
                    .notifications
                    .notify(
                        &state.db,
                        consumer_id,
                        NewNotification::new(
                            NotificationKind::DeliveryCompleted,
                            "Entrega completada",
                            format!(
                                "Tu pedido de {} litros fue entregado. ¿Cómo te fue? Califica al aguatero",
                                delivered.amount
                            ),
                        )
                        .with_data(json!({ "request_id": request_id })),
                    )
                    .await;
            }
            None => {
                if let (Some(email), Some(to)) = (&state.email, delivered.guest_email.as_deref()) {
                    let name = delivered.guest_name.as_deref().unwrap_or("vecino");
                    let url = state.config.tracking_url(&delivered.tracking_token);
                    let sent = email
                        .send_delivery_completed(
                            to,
                            name,
                            delivered.amount,
                            settings.dispute_window_hours,
                            &url,
                        )
                        .await;
                    metrics::record_notification("email", sent.is_ok());
                    if let Err(e) = sent {
                        tracing::warn!("Request {}: delivery email failed: {}", request_id, e);
                    }
                }
            }
        }

        let mut redis = state.redis.clone();
        realtime::publish(
            &mut redis,
            &realtime::request_channel(request_id),
            &RealtimeEvent::new("delivery_completed", json!({ "request_id": request_id })),
        )
        .await;

        Ok(delivered)
    }

    /// The delivery transaction: request delivered, offer completed and the
    /// owed commission booked.
    pub(crate) async fn record_delivery(
        pool: &PgPool,
        settings: &PlatformSettings,
        provider_id: Uuid,
        offer_id: Uuid,
    ) -> AppResult<(WaterRequest, LedgerEntry)> {
        let request_id: Uuid = sqlx::query_scalar("SELECT request_id FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Oferta no encontrada"))?;

        let mut tx = pool.begin().await?;
        let request = lock_request(&mut tx, request_id).await?;
        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1 FOR UPDATE")
            .bind(offer_id)
            .fetch_one(&mut *tx)
            .await?;

        if offer.provider_id != provider_id {
            return Err(AppError::forbidden("La oferta no es tuya"));
        }
        if offer.status()? != OfferStatus::Accepted || request.status()? != RequestStatus::Accepted {
            return Err(AppError::conflict("Solo puedes completar entregas en curso"));
        }

        let delivered = sqlx::query_as::<_, WaterRequest>(
            "UPDATE water_requests SET status = 'delivered', delivered_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'accepted'
             RETURNING *",
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE offers SET status = 'completed', updated_at = NOW()
             WHERE id = $1 AND status = 'accepted'",
        )
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        let commission_override: Option<f64> =
            sqlx::query_scalar("SELECT commission_override FROM profiles WHERE id = $1")
                .bind(provider_id)
                .fetch_one(&mut *tx)
                .await?;
        let percent = settings.commission_for(commission_override);
        let commission = compute_commission(offer.price, percent);

        let entry = sqlx::query_as::<_, LedgerEntry>(
            "INSERT INTO commission_ledger (provider_id, request_id, offer_id, entry_type, amount, description)
             VALUES ($1, $2, $3, 'commission_owed', $4, $5)
             RETURNING *",
        )
        .bind(provider_id)
        .bind(request_id)
        .bind(offer_id)
        .bind(commission)
        .bind(format!("Comisión {percent}% sobre entrega de {} L", request.amount))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((delivered, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{profile::VerificationStatus, request::RequestActor},
        services::offers::OfferService,
        test_utils::*,
    };

    /// Accepted 20.000 CLP offer on a consumer's request.
    async fn accepted_offer(pool: &PgPool, provider_id: Uuid) -> Offer {
        let consumer = create_consumer(pool).await;
        let request = create_request(pool, Some(consumer), false).await;
        let offer = create_offer(pool, request.id, provider_id, 20_000, 30).await;
        OfferService::settle_acceptance(pool, &RequestActor::Consumer(consumer), offer.id)
            .await
            .unwrap()
            .offer
    }

    #[sqlx::test]
    async fn delivery_books_the_default_commission(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let offer = accepted_offer(&pool, supplier.user_id).await;

        let (delivered, entry) =
            DeliveryService::record_delivery(&pool, &PlatformSettings::default(), supplier.user_id, offer.id)
                .await
                .unwrap();

        assert_eq!(delivered.status, "delivered");
        assert!(delivered.delivered_at.is_some());
        assert_eq!(offer_status(&pool, offer.id).await, "completed");
        assert_eq!(entry.entry_type, "commission_owed");
        assert_eq!(entry.amount, 3_000);
        assert_eq!(entry.offer_id, Some(offer.id));
        assert_eq!(entry.request_id, Some(delivered.id));
    }

    #[sqlx::test]
    async fn commission_override_wins(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        sqlx::query("UPDATE profiles SET commission_override = 10 WHERE id = $1")
            .bind(supplier.user_id)
            .execute(&pool)
            .await
            .unwrap();
        let offer = accepted_offer(&pool, supplier.user_id).await;

        let (_, entry) =
            DeliveryService::record_delivery(&pool, &PlatformSettings::default(), supplier.user_id, offer.id)
                .await
                .unwrap();
        assert_eq!(entry.amount, 2_000);
    }

    #[sqlx::test]
    async fn only_the_winning_supplier_completes_once(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let other = create_supplier(&pool, VerificationStatus::Approved).await;
        let offer = accepted_offer(&pool, supplier.user_id).await;
        let settings = PlatformSettings::default();

        let err = DeliveryService::record_delivery(&pool, &settings, other.user_id, offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        DeliveryService::record_delivery(&pool, &settings, supplier.user_id, offer.id)
            .await
            .unwrap();
        let err = DeliveryService::record_delivery(&pool, &settings, supplier.user_id, offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let owed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM commission_ledger WHERE offer_id = $1 AND entry_type = 'commission_owed'",
        )
        .bind(offer.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(owed, 1);
    }

    #[sqlx::test]
    async fn active_offer_cannot_be_completed(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let consumer = create_consumer(&pool).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let offer = create_offer(&pool, request.id, supplier.user_id, 20_000, 30).await;

        let err =
            DeliveryService::record_delivery(&pool, &PlatformSettings::default(), supplier.user_id, offer.id)
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(reload_request(&pool, request.id).await.status, "pending");
    }
}
