use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Active,
    Accepted,
    Expired,
    Cancelled,
    RequestFilled,
    Completed,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Active => "active",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Expired => "expired",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::RequestFilled => "request_filled",
            OfferStatus::Completed => "completed",
        }
    }

    /// active → {accepted | expired | cancelled | request_filled};
    /// accepted → {completed | cancelled}. Cancelling an accepted offer only
    /// happens when the consumer cancels the request.
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        use OfferStatus::*;
        matches!(
            (self, next),
            (Active, Accepted | Expired | Cancelled | RequestFilled)
                | (Accepted, Completed | Cancelled)
        )
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OfferStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OfferStatus::Active),
            "accepted" => Ok(OfferStatus::Accepted),
            "expired" => Ok(OfferStatus::Expired),
            "cancelled" => Ok(OfferStatus::Cancelled),
            "request_filled" => Ok(OfferStatus::RequestFilled),
            "completed" => Ok(OfferStatus::Completed),
            _ => Err(anyhow::anyhow!("Unknown offer status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub price: i32,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub message: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    pub fn status(&self) -> anyhow::Result<OfferStatus> {
        self.status.parse()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Offer joined with the supplier's public data, as the consumer sees it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OfferWithProvider {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub provider_phone: String,
    pub provider_rating: Option<f64>,
    pub provider_rating_count: i64,
    pub price: i32,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    #[serde(flatten)]
    pub offer: OfferWithProvider,
    pub countdown: String,
}

impl OfferView {
    pub fn new(offer: OfferWithProvider, now: DateTime<Utc>) -> Self {
        let countdown = format_countdown(offer.expires_at - now);
        Self { offer, countdown }
    }
}

/// Active offers first, then cheapest, then earliest delivery.
pub fn sort_for_consumer(offers: &mut [OfferWithProvider]) {
    offers.sort_by(|a, b| {
        let a_active = a.status == OfferStatus::Active.as_str();
        let b_active = b.status == OfferStatus::Active.as_str();
        b_active
            .cmp(&a_active)
            .then(a.price.cmp(&b.price))
            .then(a.delivery_window_start.cmp(&b.delivery_window_start))
    });
}

/// Remaining offer validity as shown on offer cards.
///
/// `Expirada` once elapsed, `M:SS` under one hour, `Hh MMm` otherwise.
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.num_seconds();
    if secs <= 0 {
        return "Expirada".to_string();
    }
    if secs < 3600 {
        return format!("{}:{:02}", secs / 60, secs % 60);
    }
    format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    StartInPast,
    EndNotAfterStart,
}

impl WindowError {
    pub fn message(&self) -> &'static str {
        match self {
            WindowError::StartInPast => "La hora de inicio debe ser en el futuro",
            WindowError::EndNotAfterStart => "La hora de término debe ser posterior a la de inicio",
        }
    }
}

pub fn validate_delivery_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), WindowError> {
    if start <= now {
        return Err(WindowError::StartInPast);
    }
    if end <= start {
        return Err(WindowError::EndNotAfterStart);
    }
    Ok(())
}

/// Offer validity in minutes, clamped into the admin-configured bounds.
pub fn clamp_validity(requested: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(min, max)
}

/// When an offer created at `now` lapses; `None` if out of range.
pub fn offer_expiry(now: DateTime<Utc>, validity_minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(validity_minutes).and_then(|v| now.checked_add_signed(v))
}

/// Price quoted for a request: the tier price plus the urgency surcharge.
/// `None` when the result does not fit a price column.
pub fn quote_price(tier_price: i32, is_urgent: bool, urgency_surcharge_percent: f64) -> Option<i32> {
    if !is_urgent {
        return Some(tier_price);
    }
    let surcharge = (tier_price as f64 * urgency_surcharge_percent / 100.0).round() as i64;
    i32::try_from(i64::from(tier_price).checked_add(surcharge)?).ok()
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    /// Minutes the offer stays open; defaults to the platform setting.
    pub validity_minutes: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OfferListQuery {
    pub status: Option<String>,
}

/// Offer with its request, as listed in the supplier's "my offers".
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupplierOffer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub price: i32,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub request_status: String,
    pub comuna_id: String,
    pub address: String,
    pub amount: i32,
    pub is_urgent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_with(status: &str, price: i32, start_offset_min: i64) -> OfferWithProvider {
        let now = Utc::now();
        OfferWithProvider {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            provider_name: "Aguas del Sur".into(),
            provider_phone: "+56922222222".into(),
            provider_rating: Some(4.5),
            provider_rating_count: 2,
            price,
            delivery_window_start: now + Duration::minutes(start_offset_min),
            delivery_window_end: now + Duration::minutes(start_offset_min + 60),
            expires_at: now + Duration::minutes(30),
            status: status.into(),
            message: None,
            created_at: now,
        }
    }

    #[test]
    fn offer_transitions() {
        use OfferStatus::*;
        assert!(Active.can_transition_to(Accepted));
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(RequestFilled));
        assert!(Accepted.can_transition_to(Completed));

        assert!(!Expired.can_transition_to(Accepted));
        assert!(!RequestFilled.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Completed));
    }

    #[test]
    fn countdown_thresholds() {
        assert_eq!(format_countdown(Duration::seconds(0)), "Expirada");
        assert_eq!(format_countdown(Duration::seconds(-30)), "Expirada");
        assert_eq!(format_countdown(Duration::seconds(59)), "0:59");
        assert_eq!(format_countdown(Duration::seconds(14 * 60 + 5)), "14:05");
        assert_eq!(format_countdown(Duration::seconds(3599)), "59:59");
        assert_eq!(format_countdown(Duration::seconds(3600)), "1h 00m");
        assert_eq!(format_countdown(Duration::minutes(125)), "2h 05m");
    }

    #[test]
    fn delivery_window_must_start_in_future() {
        let now = Utc::now();
        assert_eq!(
            validate_delivery_window(now - Duration::minutes(1), now + Duration::hours(1), now),
            Err(WindowError::StartInPast)
        );
        assert_eq!(
            validate_delivery_window(now, now + Duration::hours(1), now),
            Err(WindowError::StartInPast)
        );
    }

    #[test]
    fn delivery_window_end_after_start() {
        let now = Utc::now();
        let start = now + Duration::hours(1);
        assert_eq!(
            validate_delivery_window(start, start, now),
            Err(WindowError::EndNotAfterStart)
        );
        assert_eq!(
            validate_delivery_window(start, start - Duration::minutes(5), now),
            Err(WindowError::EndNotAfterStart)
        );
        assert!(validate_delivery_window(start, start + Duration::hours(2), now).is_ok());
    }

    #[test]
    fn validity_is_clamped() {
        assert_eq!(clamp_validity(None, 30, 15, 120), 30);
        assert_eq!(clamp_validity(Some(5), 30, 15, 120), 15);
        assert_eq!(clamp_validity(Some(600), 30, 15, 120), 120);
        assert_eq!(clamp_validity(Some(45), 30, 15, 120), 45);
    }

    #[test]
    fn urgency_surcharge_rounds() {
        assert_eq!(quote_price(20_000, false, 10.0), Some(20_000));
        assert_eq!(quote_price(20_000, true, 10.0), Some(22_000));
        assert_eq!(quote_price(5_005, true, 10.0), Some(5_506));
    }

    #[test]
    fn surcharge_overflow_is_refused() {
        assert_eq!(quote_price(2_000_000_000, true, 10.0), None);
        assert_eq!(quote_price(2_000_000_000, false, 10.0), Some(2_000_000_000));
        assert_eq!(quote_price(i32::MAX, true, 100.0), None);
    }

    #[test]
    fn expiry_is_now_plus_validity() {
        let now = Utc::now();
        assert_eq!(offer_expiry(now, 30), Some(now + Duration::minutes(30)));
        assert_eq!(offer_expiry(now, i64::MAX), None);
    }

    #[test]
    fn consumer_sort_puts_active_cheapest_first() {
        let mut offers = vec![
            offer_with("expired", 1_000, 10),
            offer_with("active", 30_000, 10),
            offer_with("active", 20_000, 90),
            offer_with("active", 20_000, 30),
        ];
        sort_for_consumer(&mut offers);
        let order: Vec<(String, i32)> = offers.iter().map(|o| (o.status.clone(), o.price)).collect();
        assert_eq!(
            order,
            vec![
                ("active".to_string(), 20_000),
                ("active".to_string(), 20_000),
                ("active".to_string(), 30_000),
                ("expired".to_string(), 1_000),
            ]
        );
        assert!(offers[0].delivery_window_start < offers[1].delivery_window_start);
    }
}
