use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    commission::EarningsSummary,
    document::ProviderDocument,
    profile::{Profile, RatingSummary, VerificationStatus},
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Approve,
    Reject,
    RequestMoreInfo,
}

impl VerificationDecision {
    pub fn target(&self) -> VerificationStatus {
        match self {
            VerificationDecision::Approve => VerificationStatus::Approved,
            VerificationDecision::Reject => VerificationStatus::Rejected,
            VerificationDecision::RequestMoreInfo => VerificationStatus::MoreInfoNeeded,
        }
    }

    pub fn requires_reason(&self) -> bool {
        !matches!(self, VerificationDecision::Approve)
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyProviderRequest {
    pub decision: VerificationDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Suspend,
    Ban,
    Reactivate,
}

impl StatusAction {
    pub fn target(&self) -> VerificationStatus {
        match self {
            StatusAction::Suspend => VerificationStatus::Suspended,
            StatusAction::Ban => VerificationStatus::Banned,
            StatusAction::Reactivate => VerificationStatus::Approved,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderStatusRequest {
    pub action: StatusAction,
    pub reason: Option<String>,
}

/// `None` clears the override and the platform default applies again.
#[derive(Debug, Deserialize)]
pub struct CommissionOverrideRequest {
    pub commission_percent: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderDirectoryQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProviderListItem {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub verification_status: Option<String>,
    pub is_available: bool,
    pub commission_override: Option<f64>,
    pub deliveries: i64,
    pub rating_average: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderDetail {
    pub profile: Profile,
    pub service_areas: Vec<String>,
    pub documents: Vec<ProviderDocument>,
    pub rating: RatingSummary,
    pub earnings: EarningsSummary,
    pub balance_due: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AllowedEmail {
    pub email: String,
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddAllowedEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub comuna_id: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Request row in the admin orders overview.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderOverview {
    pub id: Uuid,
    pub status: String,
    pub comuna_id: String,
    pub amount: i32,
    pub is_urgent: bool,
    pub is_guest: bool,
    pub customer_name: Option<String>,
    pub supplier_name: Option<String>,
    pub offer_count: i64,
    pub accepted_price: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_map_to_statuses() {
        assert_eq!(VerificationDecision::Approve.target(), VerificationStatus::Approved);
        assert_eq!(VerificationDecision::Reject.target(), VerificationStatus::Rejected);
        assert_eq!(
            VerificationDecision::RequestMoreInfo.target(),
            VerificationStatus::MoreInfoNeeded
        );
        assert!(!VerificationDecision::Approve.requires_reason());
        assert!(VerificationDecision::Reject.requires_reason());
    }

    #[test]
    fn reactivate_only_from_suspended() {
        let target = StatusAction::Reactivate.target();
        assert!(VerificationStatus::Suspended.can_transition_to(target));
        assert!(!VerificationStatus::Banned.can_transition_to(target));
        assert!(!VerificationStatus::Rejected.can_transition_to(target));
    }

    #[test]
    fn decision_deserializes_snake_case() {
        let req: VerifyProviderRequest =
            serde_json::from_str(r#"{"decision":"request_more_info","reason":"Falta licencia"}"#).unwrap();
        assert_eq!(req.decision, VerificationDecision::RequestMoreInfo);
    }
}
