use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    CommissionOwed,
    CommissionPaid,
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::CommissionOwed => "commission_owed",
            LedgerEntryType::CommissionPaid => "commission_paid",
            LedgerEntryType::Adjustment => "adjustment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub request_id: Option<Uuid>,
    pub offer_id: Option<Uuid>,
    pub entry_type: String,
    pub amount: i64,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Commission owed on a delivery: `round(price * percent / 100)`.
pub fn compute_commission(price: i32, commission_percent: f64) -> i64 {
    (price as f64 * commission_percent / 100.0).round() as i64
}

/// Supplier's commission position, amounts in CLP.
#[derive(Debug, Clone, Default, Serialize, FromRow, PartialEq, Eq)]
pub struct EarningsSummary {
    pub deliveries: i64,
    pub gross_sales: i64,
    pub commission_owed: i64,
    pub commission_paid: i64,
    pub adjustments: i64,
}

impl EarningsSummary {
    /// What the supplier still owes the platform. Adjustments are signed.
    pub fn balance_due(&self) -> i64 {
        self.commission_owed + self.adjustments - self.commission_paid
    }

    pub fn net_earnings(&self) -> i64 {
        self.gross_sales - self.commission_owed
    }
}

/// Per-supplier balance row in the admin settlement view.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProviderBalance {
    pub provider_id: Uuid,
    pub provider_name: String,
    pub commission_owed: i64,
    pub commission_paid: i64,
    pub adjustments: i64,
    pub balance_due: i64,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: i64,
    pub description: Option<String>,
}

impl RecordPaymentRequest {
    /// Payments are positive amounts; adjustments are signed, never zero and
    /// need a reason. Owed commission is only booked by deliveries.
    pub fn validate_for(&self, entry_type: LedgerEntryType) -> Result<(), &'static str> {
        match entry_type {
            LedgerEntryType::CommissionOwed => {
                Err("Las comisiones se registran al completar entregas")
            }
            LedgerEntryType::CommissionPaid if self.amount <= 0 => {
                Err("El monto del pago debe ser positivo")
            }
            LedgerEntryType::Adjustment if self.amount == 0 => Err("El ajuste no puede ser cero"),
            LedgerEntryType::Adjustment if self.normalized_description().is_none() => {
                Err("Indica el motivo del ajuste")
            }
            _ => Ok(()),
        }
    }

    pub fn normalized_description(&self) -> Option<&str> {
        self.description.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_rounds_half_up() {
        assert_eq!(compute_commission(20_000, 15.0), 3_000);
        assert_eq!(compute_commission(5_005, 10.0), 501);
        assert_eq!(compute_commission(1_003, 15.0), 150);
        assert_eq!(compute_commission(10_000, 0.0), 0);
        assert_eq!(compute_commission(12_345, 12.5), 1_543);
    }

    #[test]
    fn balance_due_accounts_for_payments_and_adjustments() {
        let s = EarningsSummary {
            deliveries: 3,
            gross_sales: 60_000,
            commission_owed: 9_000,
            commission_paid: 5_000,
            adjustments: -1_000,
        };
        assert_eq!(s.balance_due(), 3_000);
        assert_eq!(s.net_earnings(), 51_000);
    }

    fn entry(amount: i64, description: Option<&str>) -> RecordPaymentRequest {
        RecordPaymentRequest {
            amount,
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn adjustments_need_a_reason() {
        use LedgerEntryType::Adjustment;
        assert!(entry(-1_000, None).validate_for(Adjustment).is_err());
        assert!(entry(-1_000, Some("   ")).validate_for(Adjustment).is_err());
        assert!(entry(0, Some("Corrección")).validate_for(Adjustment).is_err());
        assert!(entry(-1_000, Some("Corrección de tarifa")).validate_for(Adjustment).is_ok());
    }

    #[test]
    fn payments_are_positive_and_owed_is_never_manual() {
        assert!(entry(5_000, None).validate_for(LedgerEntryType::CommissionPaid).is_ok());
        assert!(entry(-5_000, None).validate_for(LedgerEntryType::CommissionPaid).is_err());
        assert!(entry(5_000, Some("x")).validate_for(LedgerEntryType::CommissionOwed).is_err());
    }
}
