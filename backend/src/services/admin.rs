use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        admin::{
            AllowedEmail, OrderOverview, OrdersQuery, ProviderDetail, ProviderDirectoryQuery,
            ProviderListItem, StatusAction, VerificationDecision,
        },
        notification::{NewNotification, NotificationKind},
        page_bounds,
        profile::{Profile, ProfileRole, VerificationStatus},
    },
    services::{
        commission::CommissionService, documents::DocumentService, metrics, profiles::ProfileService,
    },
    AppState,
};

pub struct AdminService;

/// `LIKE` pattern matching `term` anywhere, with its wildcards taken literally.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

async fn load_supplier(pool: &PgPool, provider_id: Uuid) -> AppResult<Profile> {
    ProfileService::get(pool, provider_id)
        .await?
        .filter(|p| p.role() == Some(ProfileRole::Supplier))
        .ok_or_else(|| AppError::not_found("Aguatero no encontrado"))
}

fn required_reason(reason: Option<&str>) -> AppResult<&str> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::bad_request("Indica el motivo"))
}

impl AdminService {
    /// Suppliers waiting for a decision, oldest application first.
    pub async fn verification_queue(pool: &PgPool) -> AppResult<Vec<Profile>> {
        let rows = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles
             WHERE role = 'supplier' AND verification_status IN ('pending', 'more_info_needed')
             ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Applies a verification decision and tells the supplier in-app and by email.
    pub async fn decide(
        state: &AppState,
        provider_id: Uuid,
        decision: VerificationDecision,
        reason: Option<&str>,
        admin_email: &str,
    ) -> AppResult<Profile> {
        let note = if decision.requires_reason() {
            Some(required_reason(reason)?)
        } else {
            reason.map(str::trim).filter(|r| !r.is_empty())
        };
        let target = decision.target();
        let profile = Self::transition(&state.db, provider_id, target, note, admin_email).await?;
        tracing::info!("Supplier {} {} by {}", provider_id, target, admin_email);

        let (kind, title, message) = match target {
            VerificationStatus::Approved => (
                NotificationKind::VerificationApproved,
                "¡Cuenta aprobada!",
                "Ya puedes activar tu disponibilidad y enviar ofertas".to_string(),
            ),
            VerificationStatus::Rejected => (
                NotificationKind::VerificationRejected,
                "Solicitud rechazada",
                format!("Tu solicitud fue rechazada: {}", note.unwrap_or_default()),
            ),
            _ => (
                NotificationKind::VerificationMoreInfo,
                "Necesitamos más información",
                format!("Revisa tus documentos: {}", note.unwrap_or_default()),
            ),
        };
        state
            .notifications
            .notify(
                &state.db,
                provider_id,
                NewNotification::new(kind, title, message)
                    .with_data(json!({ "verification_status": target })),
            )
            .await;

        if let (Some(email), Some(to)) = (&state.email, profile.email.as_deref()) {
            let dashboard = format!("{}/supplier", state.config.app_base_url.trim_end_matches('/'));
            let sent = email
                .send_verification_result(to, &profile.full_name, target, note, &dashboard)
                .await;
            metrics::record_notification("email", sent.is_ok());
            if let Err(e) = sent {
                tracing::warn!("Verification email to {} failed: {}", provider_id, e);
            }
        }

        Ok(profile)
    }

    /// Suspends, bans or reactivates a supplier. Leaving `approved` also takes
    /// the supplier offline.
    pub async fn set_status(
        state: &AppState,
        provider_id: Uuid,
        action: StatusAction,
        reason: Option<&str>,
        admin_email: &str,
    ) -> AppResult<Profile> {
        let note = match action {
            StatusAction::Reactivate => reason.map(str::trim).filter(|r| !r.is_empty()),
            _ => Some(required_reason(reason)?),
        };
        let target = action.target();
        let profile = Self::transition(&state.db, provider_id, target, note, admin_email).await?;
        tracing::warn!("Supplier {} {} by {}", provider_id, target, admin_email);

        let message = match action {
            StatusAction::Suspend => format!("Tu cuenta fue suspendida: {}", note.unwrap_or_default()),
            StatusAction::Ban => format!("Tu cuenta fue bloqueada: {}", note.unwrap_or_default()),
            StatusAction::Reactivate => "Tu cuenta fue reactivada".to_string(),
        };
        state
            .notifications
            .notify(
                &state.db,
                provider_id,
                NewNotification::new(
                    NotificationKind::AccountStatusChanged,
                    "Estado de tu cuenta",
                    message,
                )
                .with_data(json!({ "verification_status": target })),
            )
            .await;
        Ok(profile)
    }

    async fn transition(
        pool: &PgPool,
        provider_id: Uuid,
        target: VerificationStatus,
        note: Option<&str>,
        admin_email: &str,
    ) -> AppResult<Profile> {
        let profile = load_supplier(pool, provider_id).await?;
        let current = profile.verification().unwrap_or(VerificationStatus::Pending);
        if !current.can_transition_to(target) {
            return Err(AppError::conflict(format!(
                "No se puede pasar de {current} a {target}"
            )));
        }

        let updated = sqlx::query_as::<_, Profile>(
            "UPDATE profiles
             SET verification_status = $2,
                 verification_note = $3,
                 verified_at = CASE WHEN $2 = 'approved' THEN NOW() ELSE verified_at END,
                 verified_by = $4,
                 is_available = CASE WHEN $2 = 'approved' THEN is_available ELSE FALSE END,
                 updated_at = NOW()
             WHERE id = $1 AND verification_status IS NOT DISTINCT FROM $5
             RETURNING *",
        )
        .bind(provider_id)
        .bind(target.as_str())
        .bind(note)
        .bind(admin_email)
        .bind(&profile.verification_status)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::conflict("El aguatero cambió de estado, intenta de nuevo"))?;
        Ok(updated)
    }

    pub async fn directory(pool: &PgPool, query: &ProviderDirectoryQuery) -> AppResult<Vec<ProviderListItem>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| contains_pattern(&s.to_lowercase()));
        let rows = sqlx::query_as::<_, ProviderListItem>(
            "SELECT p.id, p.full_name, p.phone, p.email, p.verification_status, p.is_available,
                    p.commission_override,
                    (SELECT COUNT(*) FROM offers o WHERE o.provider_id = p.id AND o.status = 'completed')::BIGINT
                        AS deliveries,
                    (SELECT AVG(r.rating)::DOUBLE PRECISION FROM ratings r WHERE r.provider_id = p.id)
                        AS rating_average,
                    p.created_at
             FROM profiles p
             WHERE p.role = 'supplier'
               AND ($1::text IS NULL OR p.verification_status = $1)
               AND ($2::text IS NULL
                    OR LOWER(p.full_name) LIKE $2 ESCAPE '\\'
                    OR p.phone LIKE $2 ESCAPE '\\')
             ORDER BY p.full_name",
        )
        .bind(&query.status)
        .bind(search)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn detail(pool: &PgPool, provider_id: Uuid) -> AppResult<ProviderDetail> {
        let profile = load_supplier(pool, provider_id).await?;
        let service_areas = ProfileService::service_areas(pool, provider_id).await?;
        let documents = DocumentService::list(pool, provider_id).await?;
        let rating = ProfileService::rating_summary(pool, provider_id).await?;
        let earnings = CommissionService::earnings_summary(pool, provider_id).await?;
        Ok(ProviderDetail {
            profile,
            service_areas,
            documents,
            rating,
            balance_due: earnings.balance_due(),
            earnings,
        })
    }

    pub async fn set_commission_override(
        pool: &PgPool,
        provider_id: Uuid,
        percent: Option<f64>,
        admin_email: &str,
    ) -> AppResult<Profile> {
        if percent.is_some_and(|p| !(0.0..=100.0).contains(&p)) {
            return Err(AppError::bad_request("La comisión debe estar entre 0 y 100"));
        }
        load_supplier(pool, provider_id).await?;
        let profile = sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET commission_override = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(provider_id)
        .bind(percent)
        .fetch_one(pool)
        .await?;
        tracing::info!(
            "Commission override for {} set to {:?} by {}",
            provider_id,
            percent,
            admin_email
        );
        Ok(profile)
    }

    pub async fn allowed_emails(pool: &PgPool) -> AppResult<Vec<AllowedEmail>> {
        let rows = sqlx::query_as::<_, AllowedEmail>(
            "SELECT email, added_by, created_at FROM admin_allowed_emails ORDER BY email",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_allowed_email(pool: &PgPool, email: &str, added_by: &str) -> AppResult<AllowedEmail> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AppError::bad_request("Correo electrónico inválido"));
        }
        let row = sqlx::query_as::<_, AllowedEmail>(
            "INSERT INTO admin_allowed_emails (email, added_by) VALUES ($1, $2)
             ON CONFLICT (email) DO UPDATE SET added_by = admin_allowed_emails.added_by
             RETURNING email, added_by, created_at",
        )
        .bind(&email)
        .bind(added_by)
        .fetch_one(pool)
        .await?;
        tracing::info!("Admin access granted to {} by {}", email, added_by);
        Ok(row)
    }

    /// Admins cannot remove their own access.
    pub async fn remove_allowed_email(pool: &PgPool, email: &str, removed_by: &str) -> AppResult<()> {
        let email = email.trim().to_lowercase();
        if email == removed_by.to_lowercase() {
            return Err(AppError::bad_request("No puedes quitarte tu propio acceso"));
        }
        let result = sqlx::query("DELETE FROM admin_allowed_emails WHERE email = $1")
            .bind(&email)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Correo no encontrado"));
        }
        tracing::info!("Admin access revoked for {} by {}", email, removed_by);
        Ok(())
    }

    pub async fn orders(pool: &PgPool, query: &OrdersQuery) -> AppResult<Vec<OrderOverview>> {
        let (per_page, offset) = page_bounds(query.page, query.per_page, 50, 200);
        let rows = sqlx::query_as::<_, OrderOverview>(
            "SELECT r.id, r.status, r.comuna_id, r.amount, r.is_urgent,
                    (r.consumer_id IS NULL) AS is_guest,
                    COALESCE(c.full_name, r.guest_name) AS customer_name,
                    s.full_name AS supplier_name,
                    (SELECT COUNT(*) FROM offers o WHERE o.request_id = r.id)::BIGINT AS offer_count,
                    (SELECT o.price FROM offers o
                      WHERE o.request_id = r.id AND o.status IN ('accepted', 'completed')) AS accepted_price,
                    r.created_at, r.delivered_at
             FROM water_requests r
             LEFT JOIN profiles c ON c.id = r.consumer_id
             LEFT JOIN profiles s ON s.id = r.supplier_id
             WHERE ($1::text IS NULL OR r.status = $1)
               AND ($2::text IS NULL OR r.comuna_id = $2)
             ORDER BY r.created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(&query.status)
        .bind(&query.comuna_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
