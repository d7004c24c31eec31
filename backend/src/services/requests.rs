use rand::RngCore;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::rate_limit::{check_rate_limit, guest_request_key},
    models::{
        comuna,
        notification::{NewNotification, NotificationKind, RealtimeEvent},
        offer::OfferStatus,
        page_bounds,
        profile::{Profile, ProfileRole},
        request::{
            AssignedSupplier, CreateRequestBody, OpenRequest, PaymentMethod, RequestActor,
            RequestDetail, RequestListQuery, RequestStatus, WaterRequest,
        },
    },
    services::{metrics, realtime},
    AppState,
};

/// Guests may create this many requests per email and window.
const GUEST_REQUESTS_PER_WINDOW: u64 = 5;
const GUEST_WINDOW_SECS: u64 = 3600;

/// Random 32-hex-character token guarding guest access to a request.
pub fn new_tracking_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct RequestService;

impl RequestService {
    /// Creates a request for a consumer account or, without one, a guest.
    /// Suppliers serving the comuna are told in the background.
    pub async fn create(
        state: &AppState,
        consumer: Option<&Profile>,
        body: &CreateRequestBody,
    ) -> AppResult<WaterRequest> {
        if let Some(profile) = consumer {
            if profile.role() != Some(ProfileRole::Consumer) {
                return Err(AppError::forbidden("Solo los clientes pueden pedir agua"));
            }
        }
        let is_guest = consumer.is_none();
        body.validate(is_guest).map_err(AppError::bad_request)?;
        if !comuna::is_known(&body.comuna_id) {
            return Err(AppError::bad_request("Aún no llegamos a esa comuna"));
        }

        if is_guest {
            let email = body.guest_email.as_deref().unwrap_or_default();
            let mut redis = state.redis.clone();
            check_rate_limit(
                &mut redis,
                &guest_request_key(email),
                GUEST_REQUESTS_PER_WINDOW,
                GUEST_WINDOW_SECS,
            )
            .await?;
        }

        // Account holders default to their profile contact data.
        let (name, phone, email) = match consumer {
            Some(p) => (
                body.guest_name.clone().or_else(|| Some(p.full_name.clone())),
                body.guest_phone.clone().or_else(|| Some(p.phone.clone())),
                body.guest_email.clone().or_else(|| p.email.clone()),
            ),
            None => (
                body.guest_name.clone(),
                body.guest_phone.clone(),
                body.guest_email.as_deref().map(|e| e.trim().to_lowercase()),
            ),
        };
        let payment = body.payment_method.unwrap_or(PaymentMethod::Cash);

        let request = sqlx::query_as::<_, WaterRequest>(
            "INSERT INTO water_requests
             (consumer_id, guest_name, guest_phone, guest_email, address, comuna_id,
              latitude, longitude, special_instructions, amount, is_urgent, payment_method, tracking_token)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING *",
        )
        .bind(consumer.map(|p| p.id))
        .bind(name)
        .bind(phone)
        .bind(email)
        .bind(body.address.trim())
        .bind(&body.comuna_id)
        .bind(body.latitude)
        .bind(body.longitude)
        .bind(&body.special_instructions)
        .bind(body.amount)
        .bind(body.is_urgent)
        .bind(payment.as_str())
        .bind(new_tracking_token())
        .fetch_one(&state.db)
        .await?;

        metrics::REQUESTS_CREATED
            .with_label_values(&[if is_guest { "guest" } else { "consumer" }])
            .inc();
        tracing::info!(
            "Request {} created in {} ({} L, urgent={})",
            request.id,
            request.comuna_id,
            request.amount,
            request.is_urgent
        );

        let bg_state = state.clone();
        let bg_request = request.clone();
        tokio::spawn(async move {
            Self::announce(&bg_state, &bg_request).await;
        });

        Ok(request)
    }

    /// Tells available suppliers about a new request and mails the guest
    /// their tracking link.
    async fn announce(state: &AppState, request: &WaterRequest) {
        let suppliers: Vec<Uuid> = match sqlx::query_scalar(
            "SELECT p.id FROM profiles p
             JOIN provider_service_areas a ON a.provider_id = p.id
             WHERE p.role = 'supplier' AND p.verification_status = 'approved'
               AND p.is_available = TRUE AND a.comuna_id = $1",
        )
        .bind(&request.comuna_id)
        .fetch_all(&state.db)
        .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Request {}: supplier lookup failed: {}", request.id, e);
                Vec::new()
            }
        };

        let comuna = comuna::display_name(&request.comuna_id);
        let urgency = if request.is_urgent { " (urgente)" } else { "" };
        let notification = NewNotification::new(
            NotificationKind::NewRequest,
            "Nueva solicitud de agua",
            format!("{} litros en {}{}", request.amount, comuna, urgency),
        )
        .with_data(json!({ "request_id": request.id }));
        state
            .notifications
            .notify_many(&state.db, &suppliers, notification)
            .await;

        let event = RealtimeEvent::new("request_created", json!({ "request_id": request.id }));
        let mut redis = state.redis.clone();
        for supplier in &suppliers {
            realtime::publish(&mut redis, &realtime::provider_channel(*supplier), &event).await;
        }

        if request.is_guest() {
            if let (Some(email), Some(to)) = (&state.email, request.guest_email.as_deref()) {
                let name = request.guest_name.as_deref().unwrap_or("vecino");
                let url = state.config.tracking_url(&request.tracking_token);
                if let Err(e) = email
                    .send_request_created(to, name, request.amount, &request.comuna_id, &url)
                    .await
                {
                    metrics::record_notification("email", false);
                    tracing::warn!("Request {}: confirmation email failed: {}", request.id, e);
                } else {
                    metrics::record_notification("email", true);
                }
            }
        }
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<Option<WaterRequest>> {
        let request = sqlx::query_as::<_, WaterRequest>("SELECT * FROM water_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(request)
    }

    pub async fn get_by_token(pool: &PgPool, token: &str) -> AppResult<WaterRequest> {
        sqlx::query_as::<_, WaterRequest>("SELECT * FROM water_requests WHERE tracking_token = $1")
            .bind(token)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Solicitud no encontrada"))
    }

    /// Loads a request the actor may see. Someone else's request reads as
    /// missing.
    pub async fn get_for_actor(
        pool: &PgPool,
        id: Uuid,
        actor: &RequestActor,
    ) -> AppResult<WaterRequest> {
        match Self::get(pool, id).await? {
            Some(r) if actor.may_act_on(&r) => Ok(r),
            _ => Err(AppError::not_found("Solicitud no encontrada")),
        }
    }

    pub async fn detail(pool: &PgPool, request: WaterRequest) -> AppResult<RequestDetail> {
        let supplier = match request.supplier_id {
            Some(id) => {
                sqlx::query_as::<_, AssignedSupplier>(
                    "SELECT id, full_name, phone FROM profiles WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
            None => None,
        };
        Ok(RequestDetail {
            timeline: request.timeline(),
            request,
            supplier,
        })
    }

    pub async fn list_for_consumer(
        pool: &PgPool,
        consumer_id: Uuid,
        query: &RequestListQuery,
    ) -> AppResult<Vec<WaterRequest>> {
        let (per_page, offset) = page_bounds(query.page, query.per_page, 20, 100);
        let rows = sqlx::query_as::<_, WaterRequest>(
            "SELECT * FROM water_requests
             WHERE consumer_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(consumer_id)
        .bind(&query.status)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Pending requests in the supplier's comunas it has no live offer on.
    /// Urgent first, then oldest.
    pub async fn open_for_supplier(pool: &PgPool, provider_id: Uuid) -> AppResult<Vec<OpenRequest>> {
        let rows = sqlx::query_as::<_, OpenRequest>(
            "SELECT r.id, r.comuna_id, r.address, r.amount, r.is_urgent, r.payment_method,
                    r.special_instructions, r.created_at,
                    (SELECT COUNT(*) FROM offers o
                      WHERE o.request_id = r.id AND o.status = 'active')::BIGINT AS offer_count
             FROM water_requests r
             JOIN provider_service_areas a ON a.comuna_id = r.comuna_id AND a.provider_id = $1
             WHERE r.status = 'pending'
               AND NOT EXISTS (
                   SELECT 1 FROM offers o
                   WHERE o.request_id = r.id AND o.provider_id = $1 AND o.status = 'active'
               )
             ORDER BY r.is_urgent DESC, r.created_at ASC",
        )
        .bind(provider_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Cancels a pending or accepted request. Live offers are cancelled with
    /// it and their suppliers told.
    pub async fn cancel(
        state: &AppState,
        id: Uuid,
        actor: &RequestActor,
        reason: Option<&str>,
    ) -> AppResult<WaterRequest> {
        let (cancelled, affected) = Self::mark_cancelled(&state.db, id, actor, reason).await?;

        for (provider_id, previous) in &affected {
            let message = if previous == OfferStatus::Accepted.as_str() {
                "El cliente canceló el pedido que ibas a entregar"
            } else {
                "El cliente canceló una solicitud a la que ofertaste"
            };
            state
                .notifications
                .notify(
                    &state.db,
                    *provider_id,
                    NewNotification::new(NotificationKind::RequestCancelled, "Solicitud cancelada", message)
                        .with_data(json!({ "request_id": id })),
                )
                .await;
        }

        let mut redis = state.redis.clone();
        realtime::publish(
            &mut redis,
            &realtime::request_channel(id),
            &RealtimeEvent::new("request_cancelled", json!({ "request_id": id })),
        )
        .await;

        Ok(cancelled)
    }

    /// The cancellation transaction. Returns the cancelled request and, per
    /// cancelled offer, its supplier and the status the offer had.
    pub(crate) async fn mark_cancelled(
        pool: &PgPool,
        id: Uuid,
        actor: &RequestActor,
        reason: Option<&str>,
    ) -> AppResult<(WaterRequest, Vec<(Uuid, String)>)> {
        let mut tx = pool.begin().await?;
        let request = lock_request(&mut tx, id).await?;
        if !actor.may_act_on(&request) {
            return Err(AppError::not_found("Solicitud no encontrada"));
        }
        let current = request.status()?;
        if !current.can_transition_to(RequestStatus::Cancelled) {
            return Err(AppError::conflict(format!(
                "No se puede cancelar una solicitud en estado {}",
                current.label_es().to_lowercase()
            )));
        }

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let cancelled = sqlx::query_as::<_, WaterRequest>(
            "UPDATE water_requests
             SET status = 'cancelled', cancelled_at = NOW(), cancellation_reason = $2, updated_at = NOW()
             WHERE id = $1 AND status = $3
             RETURNING *",
        )
        .bind(id)
        .bind(reason)
        .bind(current.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::conflict("La solicitud cambió de estado, intenta de nuevo"))?;

        let affected: Vec<(Uuid, String)> = sqlx::query_as(
            "UPDATE offers o SET status = 'cancelled', updated_at = NOW()
             FROM offers prev
             WHERE o.id = prev.id AND o.request_id = $1 AND o.status IN ('active', 'accepted')
             RETURNING o.provider_id, prev.status",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            "Request {} cancelled from {} ({} offer(s) cancelled)",
            id,
            current,
            affected.len()
        );
        Ok((cancelled, affected))
    }
}

/// Locks a request row for the rest of the transaction.
pub(crate) async fn lock_request(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> AppResult<WaterRequest> {
    sqlx::query_as::<_, WaterRequest>("SELECT * FROM water_requests WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::not_found("Solicitud no encontrada"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::profile::VerificationStatus,
        services::offers::OfferService,
        test_utils::*,
    };

    #[test]
    fn tracking_tokens_are_32_hex_chars() {
        let token = new_tracking_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, new_tracking_token());
    }

    #[sqlx::test]
    async fn cancelling_a_pending_request_cancels_its_offers(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        let offer = create_offer(&pool, request.id, supplier.user_id, 20_000, 30).await;

        let (cancelled, affected) = RequestService::mark_cancelled(
            &pool,
            request.id,
            &RequestActor::Consumer(consumer),
            Some("  Ya no la necesito "),
        )
        .await
        .unwrap();

        assert_eq!(cancelled.status, "cancelled");
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Ya no la necesito"));
        assert_eq!(affected, vec![(supplier.user_id, "active".to_string())]);
        assert_eq!(offer_status(&pool, offer.id).await, "cancelled");
    }

    #[sqlx::test]
    async fn cancelling_after_acceptance_cancels_the_accepted_offer(pool: PgPool) {
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, None, false).await;
        let offer = create_offer(&pool, request.id, supplier.user_id, 20_000, 30).await;
        let guest = RequestActor::Guest(request.tracking_token.clone());
        OfferService::settle_acceptance(&pool, &guest, offer.id).await.unwrap();

        let (cancelled, affected) = RequestService::mark_cancelled(&pool, request.id, &guest, None)
            .await
            .unwrap();

        assert_eq!(cancelled.status, "cancelled");
        assert_eq!(cancelled.cancellation_reason, None);
        assert_eq!(affected, vec![(supplier.user_id, "accepted".to_string())]);
        assert_eq!(offer_status(&pool, offer.id).await, "cancelled");
    }

    #[sqlx::test]
    async fn only_the_owner_cancels_and_terminal_requests_stay_put(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let stranger = create_consumer(&pool).await;
        let request = create_request(&pool, Some(consumer), false).await;

        let err = RequestService::mark_cancelled(&pool, request.id, &RequestActor::Consumer(stranger), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let owner = RequestActor::Consumer(consumer);
        RequestService::mark_cancelled(&pool, request.id, &owner, None)
            .await
            .unwrap();
        let err = RequestService::mark_cancelled(&pool, request.id, &owner, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
