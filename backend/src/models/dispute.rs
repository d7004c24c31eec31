use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    NotDelivered,
    WrongQuantity,
    LateDelivery,
    QualityIssue,
    Other,
}

impl DisputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeType::NotDelivered => "not_delivered",
            DisputeType::WrongQuantity => "wrong_quantity",
            DisputeType::LateDelivery => "late_delivery",
            DisputeType::QualityIssue => "quality_issue",
            DisputeType::Other => "other",
        }
    }

    pub fn label_es(&self) -> &'static str {
        match self {
            DisputeType::NotDelivered => "No se entregó el agua",
            DisputeType::WrongQuantity => "Cantidad incorrecta",
            DisputeType::LateDelivery => "Entrega atrasada",
            DisputeType::QualityIssue => "Problema de calidad",
            DisputeType::Other => "Otro",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    ResolvedConsumer,
    ResolvedProvider,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::ResolvedConsumer => "resolved_consumer",
            DisputeStatus::ResolvedProvider => "resolved_provider",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, DisputeStatus::ResolvedConsumer | DisputeStatus::ResolvedProvider)
    }

    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        use DisputeStatus::*;
        matches!(
            (self, next),
            (Open, UnderReview | ResolvedConsumer | ResolvedProvider)
                | (UnderReview, ResolvedConsumer | ResolvedProvider)
        )
    }
}

impl std::str::FromStr for DisputeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(DisputeStatus::Open),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved_consumer" => Ok(DisputeStatus::ResolvedConsumer),
            "resolved_provider" => Ok(DisputeStatus::ResolvedProvider),
            _ => Err(anyhow::anyhow!("Unknown dispute status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub request_id: Uuid,
    pub consumer_id: Uuid,
    pub provider_id: Uuid,
    pub dispute_type: String,
    pub description: Option<String>,
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a delivery made at `delivered_at` can still be disputed at `now`.
/// A window too large to represent never closes.
pub fn within_dispute_window(
    delivered_at: DateTime<Utc>,
    window_hours: i64,
    now: DateTime<Utc>,
) -> bool {
    match Duration::try_hours(window_hours).and_then(|w| delivered_at.checked_add_signed(w)) {
        Some(deadline) => now <= deadline,
        None => window_hours > 0,
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDisputeRequest {
    pub dispute_type: DisputeType,
    pub description: Option<String>,
}

impl CreateDisputeRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        let description = self.description.as_deref().map(str::trim).unwrap_or("");
        if self.dispute_type == DisputeType::Other && description.is_empty() {
            return Err("Describe el problema");
        }
        if description.chars().count() > 1000 {
            return Err("La descripción no puede superar 1000 caracteres");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    Consumer,
    Provider,
}

impl DisputeResolution {
    pub fn status(&self) -> DisputeStatus {
        match self {
            DisputeResolution::Consumer => DisputeStatus::ResolvedConsumer,
            DisputeResolution::Provider => DisputeStatus::ResolvedProvider,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: DisputeResolution,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisputeListQuery {
    pub status: Option<String>,
}

/// Dispute with the names an admin needs in the queue.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DisputeSummary {
    pub id: Uuid,
    pub request_id: Uuid,
    pub dispute_type: String,
    pub description: Option<String>,
    pub status: String,
    pub consumer_name: String,
    pub provider_name: String,
    pub amount: i32,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispute_window_boundaries() {
        let delivered = Utc::now() - Duration::hours(10);
        assert!(within_dispute_window(delivered, 48, Utc::now()));
        assert!(within_dispute_window(delivered, 48, delivered + Duration::hours(48)));
        assert!(!within_dispute_window(delivered, 48, delivered + Duration::hours(48) + Duration::seconds(1)));
    }

    #[test]
    fn oversized_window_does_not_panic() {
        let now = Utc::now();
        assert!(within_dispute_window(now, 10_000_000_000_000, now));
        assert!(within_dispute_window(now, i64::MAX, now));
        assert!(!within_dispute_window(now - Duration::hours(1), 0, now));
    }

    #[test]
    fn other_requires_description() {
        let req = CreateDisputeRequest { dispute_type: DisputeType::Other, description: Some("  ".into()) };
        assert!(req.validate().is_err());

        let req = CreateDisputeRequest { dispute_type: DisputeType::NotDelivered, description: None };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn dispute_transitions() {
        use DisputeStatus::*;
        assert!(Open.can_transition_to(UnderReview));
        assert!(Open.can_transition_to(ResolvedProvider));
        assert!(UnderReview.can_transition_to(ResolvedConsumer));
        assert!(!ResolvedConsumer.can_transition_to(ResolvedProvider));
        assert!(!UnderReview.can_transition_to(Open));
    }

    #[test]
    fn resolution_maps_to_status() {
        assert_eq!(DisputeResolution::Consumer.status(), DisputeStatus::ResolvedConsumer);
        assert!(DisputeResolution::Provider.status().is_resolved());
    }
}
