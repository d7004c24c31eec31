use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    middleware::roles::SupplierUser,
    models::{
        notification::{NewNotification, NotificationKind, RealtimeEvent},
        offer::{
            clamp_validity, offer_expiry, quote_price, sort_for_consumer, validate_delivery_window,
            CreateOfferRequest, Offer, OfferListQuery, OfferStatus, OfferView, OfferWithProvider,
            SupplierOffer,
        },
        request::{RequestActor, RequestStatus, WaterRequest},
    },
    services::{
        email::format_clp, metrics, realtime, requests::lock_request, settings::SettingsService,
    },
    AppState,
};

/// Offer columns joined with the supplier's name, phone and rating.
const OFFER_WITH_PROVIDER: &str =
    "SELECT o.id, o.request_id, o.provider_id,
            p.full_name AS provider_name, p.phone AS provider_phone,
            (SELECT AVG(r.rating)::DOUBLE PRECISION FROM ratings r WHERE r.provider_id = o.provider_id)
                AS provider_rating,
            (SELECT COUNT(*) FROM ratings r WHERE r.provider_id = o.provider_id)::BIGINT
                AS provider_rating_count,
            o.price, o.delivery_window_start, o.delivery_window_end, o.expires_at,
            o.status, o.message, o.created_at
     FROM offers o
     JOIN profiles p ON p.id = o.provider_id";

pub struct OfferService;

/// Result of a committed acceptance, kept for the notifications that follow.
#[derive(Debug)]
pub struct Acceptance {
    pub request: WaterRequest,
    pub offer: Offer,
    /// Suppliers whose offers ended as `request_filled`
    pub losers: Vec<Uuid>,
}

impl OfferService {
    pub async fn create(
        state: &AppState,
        supplier: &SupplierUser,
        request_id: Uuid,
        req: &CreateOfferRequest,
    ) -> AppResult<Offer> {
        let (request, offer) = Self::place(&state.db, supplier, request_id, req).await?;

        metrics::OFFERS_CREATED.inc();
        tracing::info!(
            "Offer {} by {} on request {} at {} CLP, expires {}",
            offer.id,
            supplier.user_id,
            request_id,
            offer.price,
            offer.expires_at
        );

        Self::announce(state, &request, &offer).await;
        Ok(offer)
    }

    /// Checks and stores a new offer. The request row stays locked until the
    /// insert commits.
    pub(crate) async fn place(
        pool: &PgPool,
        supplier: &SupplierUser,
        request_id: Uuid,
        req: &CreateOfferRequest,
    ) -> AppResult<(WaterRequest, Offer)> {
        supplier.require_approved()?;
        if !supplier.profile.is_available {
            return Err(AppError::bad_request(
                "Activa tu disponibilidad para enviar ofertas",
            ));
        }
        let now = Utc::now();
        validate_delivery_window(req.delivery_window_start, req.delivery_window_end, now)
            .map_err(|e| AppError::bad_request(e.message()))?;
        if req.message.as_deref().is_some_and(|m| m.chars().count() > 500) {
            return Err(AppError::bad_request("El mensaje no puede superar 500 caracteres"));
        }
        let pricing = supplier
            .profile
            .pricing()
            .ok_or_else(|| AppError::bad_request("Configura tus precios antes de ofertar"))?;

        let settings = SettingsService::load(pool).await?;
        let validity = clamp_validity(
            req.validity_minutes,
            settings.offer_validity_default,
            settings.offer_validity_min,
            settings.offer_validity_max,
        );
        let expires_at = offer_expiry(now, validity)
            .ok_or_else(|| anyhow::anyhow!("Offer validity out of range: {validity} min"))?;

        let mut tx = pool.begin().await?;
        let request = lock_request(&mut tx, request_id).await?;
        if request.status()? != RequestStatus::Pending {
            return Err(AppError::conflict("La solicitud ya no recibe ofertas"));
        }

        let serves: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM provider_service_areas WHERE provider_id = $1 AND comuna_id = $2)",
        )
        .bind(supplier.user_id)
        .bind(&request.comuna_id)
        .fetch_one(&mut *tx)
        .await?;
        if !serves {
            return Err(AppError::forbidden("La solicitud está fuera de tu zona de servicio"));
        }

        let price = quote_price(
            pricing.price_for_amount(request.amount),
            request.is_urgent,
            settings.urgency_surcharge_percent,
        )
        .ok_or_else(|| AppError::bad_request("El precio de la oferta es demasiado alto"))?;

        let inserted = sqlx::query_as::<_, Offer>(
            "INSERT INTO offers
             (request_id, provider_id, price, delivery_window_start, delivery_window_end, expires_at, message)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(request_id)
        .bind(supplier.user_id)
        .bind(price)
        .bind(req.delivery_window_start)
        .bind(req.delivery_window_end)
        .bind(expires_at)
        .bind(req.message.as_deref().map(str::trim).filter(|m| !m.is_empty()))
        .fetch_one(&mut *tx)
        .await;

        let offer = match inserted {
            Ok(o) => o,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::conflict("Ya tienes una oferta activa para esta solicitud"));
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok((request, offer))
    }

    /// Tells the request owner about a new offer: in-app for account holders,
    /// by email for guests.
    async fn announce(state: &AppState, request: &WaterRequest, offer: &Offer) {
        match request.consumer_id {
            Some(consumer_id) => {
                state
                    .notifications
                    .notify(
                        &state.db,
                        consumer_id,
                        NewNotification::new(
                            NotificationKind::NewOffer,
                            "Nueva oferta",
                            format!("Recibiste una oferta por {}", format_clp(offer.price)),
                        )
                        .with_data(json!({ "request_id": request.id, "offer_id": offer.id })),
                    )
                    .await;
            }
            None => {
                if let (Some(email), Some(to)) = (&state.email, request.guest_email.as_deref()) {
                    let name = request.guest_name.as_deref().unwrap_or("vecino");
                    let url = state.config.tracking_url(&request.tracking_token);
                    let sent = email
                        .send_new_offer(
                            to,
                            name,
                            offer.price,
                            offer.delivery_window_start,
                            offer.delivery_window_end,
                            &url,
                        )
                        .await;
                    metrics::record_notification("email", sent.is_ok());
                    if let Err(e) = sent {
                        tracing::warn!("Offer {}: guest email failed: {}", offer.id, e);
                    }
                }
            }
        }

        let mut redis = state.redis.clone();
        realtime::publish(
            &mut redis,
            &realtime::request_channel(request.id),
            &RealtimeEvent::new(
                "offer_created",
                json!({ "request_id": request.id, "offer_id": offer.id, "price": offer.price }),
            ),
        )
        .await;
    }

    /// All offers of a request in the order the consumer compares them.
    pub async fn list_for_request(pool: &PgPool, request_id: Uuid) -> AppResult<Vec<OfferView>> {
        let mut offers = sqlx::query_as::<_, OfferWithProvider>(&format!(
            "{OFFER_WITH_PROVIDER} WHERE o.request_id = $1"
        ))
        .bind(request_id)
        .fetch_all(pool)
        .await?;
        sort_for_consumer(&mut offers);

        let now = Utc::now();
        Ok(offers.into_iter().map(|o| OfferView::new(o, now)).collect())
    }

    pub async fn list_for_supplier(
        pool: &PgPool,
        provider_id: Uuid,
        query: &OfferListQuery,
    ) -> AppResult<Vec<SupplierOffer>> {
        let rows = sqlx::query_as::<_, SupplierOffer>(
            "SELECT o.id, o.request_id, o.price, o.delivery_window_start, o.delivery_window_end,
                    o.expires_at, o.status, o.message, o.created_at,
                    r.status AS request_status, r.comuna_id, r.address, r.amount, r.is_urgent
             FROM offers o
             JOIN water_requests r ON r.id = o.request_id
             WHERE o.provider_id = $1 AND ($2::text IS NULL OR o.status = $2)
             ORDER BY o.created_at DESC",
        )
        .bind(provider_id)
        .bind(&query.status)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Withdraws one of the supplier's own active offers.
    pub async fn withdraw(state: &AppState, provider_id: Uuid, offer_id: Uuid) -> AppResult<Offer> {
        let withdrawn = Self::mark_withdrawn(&state.db, provider_id, offer_id).await?;

        tracing::info!("Offer {} withdrawn by {}", offer_id, provider_id);
        let mut redis = state.redis.clone();
        realtime::publish(
            &mut redis,
            &realtime::request_channel(withdrawn.request_id),
            &RealtimeEvent::new(
                "offer_withdrawn",
                json!({ "request_id": withdrawn.request_id, "offer_id": offer_id }),
            ),
        )
        .await;
        Ok(withdrawn)
    }

    pub(crate) async fn mark_withdrawn(pool: &PgPool, provider_id: Uuid, offer_id: Uuid) -> AppResult<Offer> {
        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Oferta no encontrada"))?;
        if offer.provider_id != provider_id {
            return Err(AppError::forbidden("La oferta no es tuya"));
        }

        let withdrawn = sqlx::query_as::<_, Offer>(
            "UPDATE offers SET status = 'cancelled', updated_at = NOW()
             WHERE id = $1 AND provider_id = $2 AND status = 'active'
             RETURNING *",
        )
        .bind(offer_id)
        .bind(provider_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::conflict("Solo puedes retirar ofertas activas"))?;
        Ok(withdrawn)
    }

    /// Accepts an offer for its request.
    ///
    /// The request row is locked first so that two acceptances on the same
    /// request serialize; the loser sees a non-pending request. Every other
    /// active offer on the request ends as `request_filled`.
    pub async fn accept(state: &AppState, actor: &RequestActor, offer_id: Uuid) -> AppResult<Offer> {
        let Acceptance {
            request,
            offer: accepted,
            losers,
        } = Self::settle_acceptance(&state.db, actor, offer_id).await?;
        let request_id = request.id;

        metrics::OFFERS_ACCEPTED.inc();
        tracing::info!(
            "Offer {} accepted on request {} ({} other offer(s) filled)",
            offer_id,
            request_id,
            losers.len()
        );

        state
            .notifications
            .notify(
                &state.db,
                accepted.provider_id,
                NewNotification::new(
                    NotificationKind::OfferAccepted,
                    "¡Oferta aceptada!",
                    format!(
                        "Aceptaron tu oferta de {} por {} litros",
                        format_clp(accepted.price),
                        request.amount
                    ),
                )
                .with_data(json!({ "request_id": request_id, "offer_id": offer_id })),
            )
            .await;
        state
            .notifications
            .notify_many(
                &state.db,
                &losers,
                NewNotification::new(
                    NotificationKind::OfferNotSelected,
                    "Oferta no seleccionada",
                    "El cliente eligió otra oferta",
                )
                .with_data(json!({ "request_id": request_id })),
            )
            .await;

        let event = RealtimeEvent::new(
            "offer_accepted",
            json!({ "request_id": request_id, "offer_id": offer_id }),
        );
        let mut redis = state.redis.clone();
        realtime::publish(&mut redis, &realtime::request_channel(request_id), &event).await;
        realtime::publish(&mut redis, &realtime::provider_channel(accepted.provider_id), &event).await;

        Ok(accepted)
    }

    /// The acceptance transaction itself.
    pub(crate) async fn settle_acceptance(
        pool: &PgPool,
        actor: &RequestActor,
        offer_id: Uuid,
    ) -> AppResult<Acceptance> {
        let request_id: Uuid = sqlx::query_scalar("SELECT request_id FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Oferta no encontrada"))?;

        let mut tx = pool.begin().await?;
        let request = lock_request(&mut tx, request_id).await?;
        if !actor.may_act_on(&request) {
            return Err(AppError::not_found("Oferta no encontrada"));
        }
        if request.status()? != RequestStatus::Pending {
            return Err(AppError::conflict("Esta solicitud ya tiene una oferta aceptada"));
        }

        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1 FOR UPDATE")
            .bind(offer_id)
            .fetch_one(&mut *tx)
            .await?;
        if offer.status()? != OfferStatus::Active {
            return Err(AppError::conflict("La oferta ya no está disponible"));
        }
        if offer.is_expired_at(Utc::now()) {
            return Err(AppError::conflict("La oferta expiró"));
        }

        let accepted = sqlx::query_as::<_, Offer>(
            "UPDATE offers SET status = 'accepted', accepted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'active'
             RETURNING *",
        )
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE water_requests
             SET status = 'accepted', supplier_id = $2, accepted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(request_id)
        .bind(accepted.provider_id)
        .execute(&mut *tx)
        .await?;

        let losers: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE offers SET status = 'request_filled', updated_at = NOW()
             WHERE request_id = $1 AND id <> $2 AND status = 'active'
             RETURNING provider_id",
        )
        .bind(request_id)
        .bind(offer_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Acceptance {
            request,
            offer: accepted,
            losers,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{models::profile::VerificationStatus, test_utils::*};

    fn offer_body(validity_minutes: Option<i64>) -> CreateOfferRequest {
        let start = Utc::now() + Duration::hours(1);
        CreateOfferRequest {
            delivery_window_start: start,
            delivery_window_end: start + Duration::hours(2),
            validity_minutes,
            message: Some("  Llego en la tarde  ".into()),
        }
    }

    #[sqlx::test]
    async fn placed_offer_is_priced_from_tier_and_urgency(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), true).await;

        let before = Utc::now();
        let (_, offer) = OfferService::place(&pool, &supplier, request.id, &offer_body(Some(5)))
            .await
            .unwrap();

        // 1000 L tier plus the default 10% urgency surcharge
        assert_eq!(offer.price, 22_000);
        assert_eq!(offer.status, "active");
        assert_eq!(offer.message.as_deref(), Some("Llego en la tarde"));
        // Requested 5 min is raised to the 15 min minimum
        assert!(offer.expires_at >= before + Duration::minutes(15));
        assert!(offer.expires_at <= Utc::now() + Duration::minutes(15));
    }

    #[sqlx::test]
    async fn one_active_offer_per_supplier_and_request(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;

        OfferService::place(&pool, &supplier, request.id, &offer_body(None))
            .await
            .unwrap();
        let err = OfferService::place(&pool, &supplier, request.id, &offer_body(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[sqlx::test]
    async fn suspended_supplier_cannot_place_offers(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Suspended).await;
        let request = create_request(&pool, Some(consumer), false).await;

        let err = OfferService::place(&pool, &supplier, request.id, &offer_body(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[sqlx::test]
    async fn request_outside_service_area_is_refused(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        sqlx::query("UPDATE water_requests SET comuna_id = 'pucon' WHERE id = $1")
            .bind(request.id)
            .execute(&pool)
            .await
            .unwrap();

        let err = OfferService::place(&pool, &supplier, request.id, &offer_body(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[sqlx::test]
    async fn acceptance_fills_the_other_offers(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let winner = create_supplier(&pool, VerificationStatus::Approved).await;
        let loser = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let chosen = create_offer(&pool, request.id, winner.user_id, 20_000, 30).await;
        let other = create_offer(&pool, request.id, loser.user_id, 18_000, 30).await;

        let acceptance =
            OfferService::settle_acceptance(&pool, &RequestActor::Consumer(consumer), chosen.id)
                .await
                .unwrap();

        assert_eq!(acceptance.offer.status, "accepted");
        assert!(acceptance.offer.accepted_at.is_some());
        assert_eq!(acceptance.losers, vec![loser.user_id]);
        assert_eq!(offer_status(&pool, other.id).await, "request_filled");

        let request = reload_request(&pool, request.id).await;
        assert_eq!(request.status, "accepted");
        assert_eq!(request.supplier_id, Some(winner.user_id));
        assert!(request.accepted_at.is_some());
    }

    #[sqlx::test]
    async fn second_acceptance_conflicts(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let a = create_supplier(&pool, VerificationStatus::Approved).await;
        let b = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let first = create_offer(&pool, request.id, a.user_id, 20_000, 30).await;
        let second = create_offer(&pool, request.id, b.user_id, 19_000, 30).await;
        let actor = RequestActor::Consumer(consumer);

        OfferService::settle_acceptance(&pool, &actor, first.id).await.unwrap();
        let err = OfferService::settle_acceptance(&pool, &actor, second.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(offer_status(&pool, second.id).await, "request_filled");
    }

    #[sqlx::test]
    async fn lapsed_offer_cannot_be_accepted(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let offer = create_offer(&pool, request.id, supplier.user_id, 20_000, -1).await;

        let err = OfferService::settle_acceptance(&pool, &RequestActor::Consumer(consumer), offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(reload_request(&pool, request.id).await.status, "pending");
        assert_eq!(offer_status(&pool, offer.id).await, "active");
    }

    #[sqlx::test]
    async fn guests_accept_with_their_tracking_token_only(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, None, false).await;
        let offer = create_offer(&pool, request.id, supplier.user_id, 20_000, 30).await;

        let err = OfferService::settle_acceptance(&pool, &RequestActor::Guest("f".repeat(32)), offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let stranger = create_consumer(&pool).await;
        let err = OfferService::settle_acceptance(&pool, &RequestActor::Consumer(stranger), offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let token = RequestActor::Guest(request.tracking_token.clone());
        OfferService::settle_acceptance(&pool, &token, offer.id).await.unwrap();
    }

    #[sqlx::test]
    async fn only_the_owner_withdraws_an_active_offer(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let owner = create_supplier(&pool, VerificationStatus::Approved).await;
        let other = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let offer = create_offer(&pool, request.id, owner.user_id, 20_000, 30).await;

        let err = OfferService::mark_withdrawn(&pool, other.user_id, offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let withdrawn = OfferService::mark_withdrawn(&pool, owner.user_id, offer.id)
            .await
            .unwrap();
        assert_eq!(withdrawn.status, "cancelled");

        let err = OfferService::mark_withdrawn(&pool, owner.user_id, offer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
