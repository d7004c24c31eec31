use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        commission::{EarningsSummary, LedgerEntry, LedgerEntryType, ProviderBalance, RecordPaymentRequest},
        profile::ProfileRole,
    },
    services::profiles::ProfileService,
};

pub struct CommissionService;

impl CommissionService {
    pub async fn earnings_summary(pool: &PgPool, provider_id: Uuid) -> AppResult<EarningsSummary> {
        let summary = sqlx::query_as::<_, EarningsSummary>(
            "SELECT
                (SELECT COUNT(*) FROM offers WHERE provider_id = $1 AND status = 'completed')::BIGINT
                    AS deliveries,
                (SELECT COALESCE(SUM(price), 0) FROM offers WHERE provider_id = $1 AND status = 'completed')::BIGINT
                    AS gross_sales,
                COALESCE(SUM(amount) FILTER (WHERE entry_type = 'commission_owed'), 0)::BIGINT AS commission_owed,
                COALESCE(SUM(amount) FILTER (WHERE entry_type = 'commission_paid'), 0)::BIGINT AS commission_paid,
                COALESCE(SUM(amount) FILTER (WHERE entry_type = 'adjustment'), 0)::BIGINT AS adjustments
             FROM commission_ledger
             WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_one(pool)
        .await?;
        Ok(summary)
    }

    /// Settlement view: every supplier with ledger activity, biggest debt first.
    pub async fn provider_balances(pool: &PgPool) -> AppResult<Vec<ProviderBalance>> {
        let rows = sqlx::query_as::<_, ProviderBalance>(
            "SELECT provider_id, provider_name, commission_owed, commission_paid, adjustments,
                    commission_owed + adjustments - commission_paid AS balance_due
             FROM (
                SELECT l.provider_id, p.full_name AS provider_name,
                       COALESCE(SUM(l.amount) FILTER (WHERE l.entry_type = 'commission_owed'), 0)::BIGINT
                           AS commission_owed,
                       COALESCE(SUM(l.amount) FILTER (WHERE l.entry_type = 'commission_paid'), 0)::BIGINT
                           AS commission_paid,
                       COALESCE(SUM(l.amount) FILTER (WHERE l.entry_type = 'adjustment'), 0)::BIGINT
                           AS adjustments
                FROM commission_ledger l
                JOIN profiles p ON p.id = l.provider_id
                GROUP BY l.provider_id, p.full_name
             ) totals
             ORDER BY balance_due DESC, provider_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Appends a payment or adjustment.
    pub async fn record_entry(
        pool: &PgPool,
        provider_id: Uuid,
        entry_type: LedgerEntryType,
        req: &RecordPaymentRequest,
        created_by: &str,
    ) -> AppResult<LedgerEntry> {
        req.validate_for(entry_type).map_err(AppError::bad_request)?;

        let provider = ProfileService::get(pool, provider_id)
            .await?
            .filter(|p| p.role() == Some(ProfileRole::Supplier))
            .ok_or_else(|| AppError::not_found("Aguatero no encontrado"))?;

        let entry = sqlx::query_as::<_, LedgerEntry>(
            "INSERT INTO commission_ledger (provider_id, entry_type, amount, description, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(provider.id)
        .bind(entry_type.as_str())
        .bind(req.amount)
        .bind(req.normalized_description())
        .bind(created_by)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            "Ledger {} of {} CLP for {} recorded by {}",
            entry_type.as_str(),
            req.amount,
            provider_id,
            created_by
        );
        Ok(entry)
    }

    pub async fn ledger(pool: &PgPool, provider_id: Option<Uuid>) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM commission_ledger
             WHERE ($1::uuid IS NULL OR provider_id = $1)
             ORDER BY created_at DESC",
        )
        .bind(provider_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

/// Renders ledger entries as CSV for the accounting export.
pub fn ledger_csv(entries: &[LedgerEntry]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "fecha",
        "aguatero",
        "solicitud",
        "tipo",
        "monto",
        "descripcion",
        "registrado_por",
    ])?;
    for e in entries {
        writer.write_record([
            e.id.to_string(),
            e.created_at.to_rfc3339(),
            e.provider_id.to_string(),
            e.request_id.map(|id| id.to_string()).unwrap_or_default(),
            e.entry_type.clone(),
            e.amount.to_string(),
            e.description.clone().unwrap_or_default(),
            e.created_by.clone().unwrap_or_default(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}
