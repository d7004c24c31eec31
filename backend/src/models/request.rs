use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Volumes (liters) a consumer can order.
pub const ALLOWED_AMOUNTS: &[i32] = &[100, 1000, 5000, 10000];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Delivered,
    Cancelled,
    NoOffers,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Delivered => "delivered",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::NoOffers => "no_offers",
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | NoOffers | Cancelled) | (Accepted, Delivered | Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Delivered | RequestStatus::Cancelled | RequestStatus::NoOffers
        )
    }

    /// Label shown on the consumer's tracking timeline.
    pub fn label_es(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Esperando ofertas",
            RequestStatus::Accepted => "En camino",
            RequestStatus::Delivered => "Entregado",
            RequestStatus::Cancelled => "Cancelado",
            RequestStatus::NoOffers => "Sin ofertas",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "delivered" => Ok(RequestStatus::Delivered),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "no_offers" => Ok(RequestStatus::NoOffers),
            _ => Err(anyhow::anyhow!("Unknown request status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

/// DB row struct. Status is fetched as TEXT.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaterRequest {
    pub id: Uuid,
    pub consumer_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub guest_email: Option<String>,
    pub address: String,
    pub comuna_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub special_instructions: Option<String>,
    pub amount: i32,
    pub is_urgent: bool,
    pub payment_method: String,
    pub status: String,
    #[serde(skip_serializing)]
    pub tracking_token: String,
    pub supplier_id: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaterRequest {
    pub fn status(&self) -> anyhow::Result<RequestStatus> {
        self.status.parse()
    }

    pub fn is_guest(&self) -> bool {
        self.consumer_id.is_none()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.consumer_id == Some(user_id)
    }
}

/// Who is acting on a request: an account holder or a guest holding the tracking link.
#[derive(Debug, Clone)]
pub enum RequestActor {
    Consumer(Uuid),
    Guest(String),
}

impl RequestActor {
    pub fn may_act_on(&self, request: &WaterRequest) -> bool {
        match self {
            RequestActor::Consumer(user_id) => request.is_owned_by(*user_id),
            RequestActor::Guest(token) => request.tracking_token == *token,
        }
    }
}

/// One step of the tracking timeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineStep {
    pub status: RequestStatus,
    pub label: &'static str,
    pub at: Option<DateTime<Utc>>,
    pub reached: bool,
}

impl WaterRequest {
    /// Timeline of the happy path, or a short one ending in the terminal
    /// failure state.
    pub fn timeline(&self) -> Vec<TimelineStep> {
        let status = self.status().unwrap_or(RequestStatus::Pending);
        let step = |status: RequestStatus, at: Option<DateTime<Utc>>| TimelineStep {
            status,
            label: status.label_es(),
            at,
            reached: at.is_some(),
        };

        let mut steps = vec![step(RequestStatus::Pending, Some(self.created_at))];
        match status {
            RequestStatus::Cancelled => {
                if self.accepted_at.is_some() {
                    steps.push(step(RequestStatus::Accepted, self.accepted_at));
                }
                steps.push(step(RequestStatus::Cancelled, self.cancelled_at));
            }
            RequestStatus::NoOffers => {
                steps.push(step(RequestStatus::NoOffers, Some(self.updated_at)));
            }
            _ => {
                steps.push(step(RequestStatus::Accepted, self.accepted_at));
                steps.push(step(RequestStatus::Delivered, self.delivered_at));
            }
        }
        steps
    }
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    // contact (required for guests)
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub guest_email: Option<String>,
    // location
    pub address: String,
    pub comuna_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub special_instructions: Option<String>,
    // amount
    pub amount: i32,
    #[serde(default)]
    pub is_urgent: bool,
    pub payment_method: Option<PaymentMethod>,
}

impl CreateRequestBody {
    /// Guests must leave name, phone and email so suppliers and the
    /// tracking emails can reach them.
    pub fn validate(&self, is_guest: bool) -> Result<(), &'static str> {
        if self.address.trim().is_empty() {
            return Err("La dirección es obligatoria");
        }
        if !ALLOWED_AMOUNTS.contains(&self.amount) {
            return Err("Cantidad no válida");
        }
        if let (Some(lat), Some(lng)) = (self.latitude, self.longitude) {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err("Coordenadas inválidas");
            }
        }
        if is_guest {
            let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
            if !filled(&self.guest_name) || !filled(&self.guest_phone) || !filled(&self.guest_email) {
                return Err("Nombre, teléfono y correo son obligatorios");
            }
            if !self.guest_email.as_deref().is_some_and(|e| e.contains('@')) {
                return Err("Correo electrónico inválido");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequestBody {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Request as shown to suppliers browsing open work: no guest contact data.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OpenRequest {
    pub id: Uuid,
    pub comuna_id: String,
    pub address: String,
    pub amount: i32,
    pub is_urgent: bool,
    pub payment_method: String,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub offer_count: i64,
}

/// Supplier contact shown once an offer has been accepted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssignedSupplier {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
}

/// Request as its owner or guest sees it on the tracking page.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: WaterRequest,
    pub timeline: Vec<TimelineStep>,
    pub supplier: Option<AssignedSupplier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: &str) -> WaterRequest {
        let now = Utc::now();
        WaterRequest {
            id: Uuid::new_v4(),
            consumer_id: None,
            guest_name: Some("Ana".into()),
            guest_phone: Some("+56911111111".into()),
            guest_email: Some("ana@example.cl".into()),
            address: "Camino Real 123".into(),
            comuna_id: "pucon".into(),
            latitude: None,
            longitude: None,
            special_instructions: None,
            amount: 1000,
            is_urgent: false,
            payment_method: "cash".into(),
            status: status.into(),
            tracking_token: "abc".into(),
            supplier_id: None,
            accepted_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn request_transitions() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(NoOffers));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Delivered));
        assert!(Accepted.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!NoOffers.can_transition_to(Accepted));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(RequestStatus::Delivered.is_terminal());
        assert!(RequestStatus::NoOffers.is_terminal());
        assert!(!RequestStatus::Accepted.is_terminal());
    }

    #[test]
    fn guest_actor_needs_matching_token() {
        let req = request("pending");
        assert!(RequestActor::Guest("abc".into()).may_act_on(&req));
        assert!(!RequestActor::Guest("zzz".into()).may_act_on(&req));
        assert!(!RequestActor::Consumer(Uuid::new_v4()).may_act_on(&req));
    }

    #[test]
    fn timeline_for_accepted_request() {
        let mut req = request("accepted");
        req.accepted_at = Some(Utc::now());
        let steps = req.timeline();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].reached);
        assert!(steps[1].reached);
        assert!(!steps[2].reached);
        assert_eq!(steps[2].status, RequestStatus::Delivered);
    }

    #[test]
    fn timeline_for_cancelled_pending_request() {
        let mut req = request("cancelled");
        req.cancelled_at = Some(Utc::now());
        let steps = req.timeline();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].status, RequestStatus::Cancelled);
        assert!(steps[1].reached);
    }

    fn body(amount: i32) -> CreateRequestBody {
        CreateRequestBody {
            guest_name: Some("Ana".into()),
            guest_phone: Some("+56911111111".into()),
            guest_email: Some("ana@example.cl".into()),
            address: "Camino Real 123".into(),
            comuna_id: "pucon".into(),
            latitude: None,
            longitude: None,
            special_instructions: None,
            amount,
            is_urgent: false,
            payment_method: None,
        }
    }

    #[test]
    fn create_body_amounts() {
        assert!(body(1000).validate(true).is_ok());
        assert!(body(2000).validate(true).is_err());
        assert!(body(0).validate(false).is_err());
    }

    #[test]
    fn guests_need_contact_data() {
        let mut b = body(100);
        b.guest_email = None;
        assert!(b.validate(true).is_err());
        assert!(b.validate(false).is_ok());

        let mut b = body(100);
        b.guest_email = Some("no-arroba".into());
        assert_eq!(b.validate(true), Err("Correo electrónico inválido"));
    }
}
