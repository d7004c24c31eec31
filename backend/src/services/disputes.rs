use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::{
        dispute::{
            within_dispute_window, CreateDisputeRequest, Dispute, DisputeStatus, DisputeSummary,
            ResolveDisputeRequest,
        },
        notification::{NewNotification, NotificationKind},
        request::RequestStatus,
    },
    services::{metrics, requests::RequestService, settings::SettingsService},
    AppState,
};

pub struct DisputeService;

impl DisputeService {
    /// Files a dispute on a delivered request inside the dispute window.
    pub async fn file(
        state: &AppState,
        consumer_id: Uuid,
        request_id: Uuid,
        req: &CreateDisputeRequest,
    ) -> AppResult<Dispute> {
        let dispute = Self::open(&state.db, consumer_id, request_id, req).await?;

        metrics::DISPUTES_OPENED.inc();
        tracing::info!(
            "Dispute {} ({}) opened on request {}",
            dispute.id,
            dispute.dispute_type,
            request_id
        );

        state
            .notifications
            .notify(
                &state.db,
                dispute.provider_id,
                NewNotification::new(
                    NotificationKind::DisputeOpened,
                    "Reclamo recibido",
                    format!(
                        "Un cliente reportó un problema: {}",
                        req.dispute_type.label_es()
                    ),
                )
                .with_data(json!({ "request_id": request_id, "dispute_id": dispute.id })),
            )
            .await;

        Ok(dispute)
    }

    /// Checks the filing rules and stores the dispute.
    pub(crate) async fn open(
        pool: &PgPool,
        consumer_id: Uuid,
        request_id: Uuid,
        req: &CreateDisputeRequest,
    ) -> AppResult<Dispute> {
        req.validate().map_err(AppError::bad_request)?;

        let request = RequestService::get(pool, request_id)
            .await?
            .filter(|r| r.is_owned_by(consumer_id))
            .ok_or_else(|| AppError::not_found("Solicitud no encontrada"))?;
        if request.status()? != RequestStatus::Delivered {
            return Err(AppError::bad_request("Solo puedes reclamar pedidos entregados"));
        }
        let (Some(delivered_at), Some(provider_id)) = (request.delivered_at, request.supplier_id) else {
            return Err(AppError::bad_request("Solo puedes reclamar pedidos entregados"));
        };

        let settings = SettingsService::load(pool).await?;
        if !within_dispute_window(delivered_at, settings.dispute_window_hours, Utc::now()) {
            return Err(AppError::bad_request(format!(
                "El plazo de {} horas para reclamar ya venció",
                settings.dispute_window_hours
            )));
        }

        if Self::for_request(pool, request_id).await?.is_some() {
            return Err(AppError::conflict("Ya existe un reclamo para este pedido"));
        }

        let description = req
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        let inserted = sqlx::query_as::<_, Dispute>(
            "INSERT INTO disputes (request_id, consumer_id, provider_id, dispute_type, description)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(request_id)
        .bind(consumer_id)
        .bind(provider_id)
        .bind(req.dispute_type.as_str())
        .bind(description)
        .fetch_one(pool)
        .await;

        let dispute = match inserted {
            Ok(d) => d,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::conflict("Ya existe un reclamo para este pedido"));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(dispute)
    }

    pub async fn for_request(pool: &PgPool, request_id: Uuid) -> AppResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(pool)
            .await?;
        Ok(dispute)
    }

    pub async fn list(pool: &PgPool, status: Option<&str>) -> AppResult<Vec<DisputeSummary>> {
        if let Some(s) = status {
            s.parse::<DisputeStatus>()
                .map_err(|_| AppError::bad_request("Estado de reclamo inválido"))?;
        }
        let rows = sqlx::query_as::<_, DisputeSummary>(
            "SELECT d.id, d.request_id, d.dispute_type, d.description, d.status,
                    c.full_name AS consumer_name, p.full_name AS provider_name,
                    r.amount, r.delivered_at, d.created_at
             FROM disputes d
             JOIN profiles c ON c.id = d.consumer_id
             JOIN profiles p ON p.id = d.provider_id
             JOIN water_requests r ON r.id = d.request_id
             WHERE ($1::text IS NULL OR d.status = $1)
             ORDER BY d.created_at ASC",
        )
        .bind(status)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    async fn get(pool: &PgPool, id: Uuid) -> AppResult<Dispute> {
        sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Reclamo no encontrado"))
    }

    async fn transition(
        pool: &PgPool,
        id: Uuid,
        next: DisputeStatus,
        notes: Option<&str>,
        admin_email: &str,
    ) -> AppResult<Dispute> {
        let dispute = Self::get(pool, id).await?;
        let current: DisputeStatus = dispute.status.parse()?;
        if !current.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "No se puede pasar de {} a {}",
                current.as_str(),
                next.as_str()
            )));
        }

        let resolved = next.is_resolved();
        sqlx::query_as::<_, Dispute>(
            "UPDATE disputes
             SET status = $2,
                 resolution_notes = CASE WHEN $4 THEN $3 ELSE resolution_notes END,
                 resolved_by = CASE WHEN $4 THEN $5 ELSE resolved_by END,
                 resolved_at = CASE WHEN $4 THEN NOW() ELSE resolved_at END,
                 updated_at = NOW()
             WHERE id = $1 AND status = $6
             RETURNING *",
        )
        .bind(id)
        .bind(next.as_str())
        .bind(notes)
        .bind(resolved)
        .bind(admin_email)
        .bind(current.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::conflict("El reclamo cambió de estado, intenta de nuevo"))
    }

    pub async fn mark_under_review(state: &AppState, id: Uuid, admin_email: &str) -> AppResult<Dispute> {
        let dispute =
            Self::transition(&state.db, id, DisputeStatus::UnderReview, None, admin_email).await?;
        tracing::info!("Dispute {} under review by {}", id, admin_email);
        Ok(dispute)
    }

    /// Closes a dispute in favour of one party and tells both.
    pub async fn resolve(
        state: &AppState,
        id: Uuid,
        req: &ResolveDisputeRequest,
        admin_email: &str,
    ) -> AppResult<Dispute> {
        let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let dispute =
            Self::transition(&state.db, id, req.resolution.status(), notes, admin_email).await?;
        tracing::info!(
            "Dispute {} resolved as {} by {}",
            id,
            dispute.status,
            admin_email
        );

        let outcome = if req.resolution.status() == DisputeStatus::ResolvedConsumer {
            "a favor del cliente"
        } else {
            "a favor del aguatero"
        };
        let notification = NewNotification::new(
            NotificationKind::DisputeResolved,
            "Reclamo resuelto",
            format!("El reclamo fue resuelto {outcome}"),
        )
        .with_data(json!({
            "request_id": dispute.request_id,
            "dispute_id": dispute.id,
            "status": dispute.status,
        }));
        state
            .notifications
            .notify_many(&state.db, &[dispute.consumer_id, dispute.provider_id], notification)
            .await;

        Ok(dispute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{dispute::DisputeType, profile::VerificationStatus},
        test_utils::*,
    };

    fn report(dispute_type: DisputeType, description: Option<&str>) -> CreateDisputeRequest {
        CreateDisputeRequest {
            dispute_type,
            description: description.map(str::to_string),
        }
    }

    #[sqlx::test]
    async fn a_delivery_is_disputed_once(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        mark_delivered(&pool, request.id, supplier.user_id, 2).await;

        let dispute = DisputeService::open(
            &pool,
            consumer,
            request.id,
            &report(DisputeType::WrongQuantity, Some("  Llegaron 800 litros ")),
        )
        .await
        .unwrap();
        assert_eq!(dispute.status, "open");
        assert_eq!(dispute.provider_id, supplier.user_id);
        assert_eq!(dispute.description.as_deref(), Some("Llegaron 800 litros"));

        let err = DisputeService::open(&pool, consumer, request.id, &report(DisputeType::LateDelivery, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[sqlx::test]
    async fn disputes_close_with_the_window(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;
        mark_delivered(&pool, request.id, supplier.user_id, 49).await;

        let err = DisputeService::open(&pool, consumer, request.id, &report(DisputeType::NotDelivered, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[sqlx::test]
    async fn only_delivered_requests_of_the_owner(pool: PgPool) {
        let consumer = create_consumer(&pool).await;
        let stranger = create_consumer(&pool).await;
        let supplier = create_supplier(&pool, VerificationStatus::Approved).await;
        let request = create_request(&pool, Some(consumer), false).await;

        let err = DisputeService::open(&pool, consumer, request.id, &report(DisputeType::NotDelivered, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        mark_delivered(&pool, request.id, supplier.user_id, 1).await;
        let err = DisputeService::open(&pool, stranger, request.id, &report(DisputeType::NotDelivered, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
