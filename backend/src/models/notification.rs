use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    NewOffer,
    OfferAccepted,
    OfferNotSelected,
    OfferExpired,
    RequestCancelled,
    NoOffers,
    DeliveryCompleted,
    DisputeOpened,
    DisputeResolved,
    VerificationApproved,
    VerificationRejected,
    VerificationMoreInfo,
    AccountStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewRequest => "new_request",
            NotificationKind::NewOffer => "new_offer",
            NotificationKind::OfferAccepted => "offer_accepted",
            NotificationKind::OfferNotSelected => "offer_not_selected",
            NotificationKind::OfferExpired => "offer_expired",
            NotificationKind::RequestCancelled => "request_cancelled",
            NotificationKind::NoOffers => "no_offers",
            NotificationKind::DeliveryCompleted => "delivery_completed",
            NotificationKind::DisputeOpened => "dispute_opened",
            NotificationKind::DisputeResolved => "dispute_resolved",
            NotificationKind::VerificationApproved => "verification_approved",
            NotificationKind::VerificationRejected => "verification_rejected",
            NotificationKind::VerificationMoreInfo => "verification_more_info",
            NotificationKind::AccountStatusChanged => "account_status_changed",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// In-app notification about to be stored and pushed.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Event pushed over the realtime channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new(kind: &str, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn realtime_event_serializes_type_field() {
        let ev = RealtimeEvent::new("offer_created", json!({ "id": 1 }));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "offer_created");
        assert_eq!(v["payload"]["id"], 1);
    }

    #[test]
    fn notification_kind_wire_names() {
        assert_eq!(NotificationKind::OfferNotSelected.as_str(), "offer_not_selected");
        let v = serde_json::to_value(NotificationKind::VerificationMoreInfo).unwrap();
        assert_eq!(v, "verification_more_info");
    }
}
