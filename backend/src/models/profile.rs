use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Consumer,
    Supplier,
}

impl std::fmt::Display for ProfileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProfileRole::Consumer => "consumer",
            ProfileRole::Supplier => "supplier",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProfileRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer" => Ok(ProfileRole::Consumer),
            "supplier" => Ok(ProfileRole::Supplier),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
    MoreInfoNeeded,
    Suspended,
    Banned,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::MoreInfoNeeded => "more_info_needed",
            VerificationStatus::Suspended => "suspended",
            VerificationStatus::Banned => "banned",
        }
    }

    /// Allowed moves of the supplier verification workflow.
    /// A ban is reachable from everywhere except itself and is final.
    pub fn can_transition_to(&self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;
        match (self, next) {
            (Banned, _) => false,
            (_, Banned) => true,
            (Pending, Approved | Rejected | MoreInfoNeeded) => true,
            (MoreInfoNeeded, Pending | Approved | Rejected) => true,
            (Approved, Suspended) => true,
            (Suspended, Approved) => true,
            _ => false,
        }
    }

    /// Suppliers in these states can submit offers.
    pub fn can_operate(&self) -> bool {
        matches!(self, VerificationStatus::Approved)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            "more_info_needed" => Ok(VerificationStatus::MoreInfoNeeded),
            "suspended" => Ok(VerificationStatus::Suspended),
            "banned" => Ok(VerificationStatus::Banned),
            _ => Err(anyhow::anyhow!("Unknown verification_status: {s}")),
        }
    }
}

/// DB row struct; enums are fetched as TEXT and parsed where needed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub role: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub comuna_id: Option<String>,
    pub special_instructions: Option<String>,
    pub verification_status: Option<String>,
    pub verification_note: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub is_available: bool,
    pub commission_override: Option<f64>,
    pub price_100l: Option<i32>,
    pub price_1000l: Option<i32>,
    pub price_5000l: Option<i32>,
    pub price_10000l: Option<i32>,
    pub vehicle_type: Option<String>,
    pub vehicle_capacity: Option<i32>,
    #[serde(skip_serializing)]
    pub bank_name: Option<String>,
    #[serde(skip_serializing)]
    pub bank_account_type: Option<String>,
    #[serde(skip_serializing)]
    pub bank_account_number: Option<String>,
    #[serde(skip_serializing)]
    pub bank_rut: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn role(&self) -> Option<ProfileRole> {
        self.role.parse().ok()
    }

    pub fn verification(&self) -> Option<VerificationStatus> {
        self.verification_status.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn pricing(&self) -> Option<PricingTiers> {
        Some(PricingTiers {
            price_100l: self.price_100l?,
            price_1000l: self.price_1000l?,
            price_5000l: self.price_5000l?,
            price_10000l: self.price_10000l?,
        })
    }

    pub fn bank_info(&self) -> Option<BankInfo> {
        Some(BankInfo {
            bank_name: self.bank_name.clone()?,
            account_type: self.bank_account_type.clone()?,
            account_number: self.bank_account_number.clone()?,
            rut: self.bank_rut.clone()?,
        })
    }
}

/// Supplier prices (CLP) per delivered volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingTiers {
    pub price_100l: i32,
    pub price_1000l: i32,
    pub price_5000l: i32,
    pub price_10000l: i32,
}

/// Highest accepted tier price (CLP).
pub const MAX_TIER_PRICE: i32 = 10_000_000;

impl PricingTiers {
    pub fn validate(&self) -> Result<(), &'static str> {
        let tiers = [self.price_100l, self.price_1000l, self.price_5000l, self.price_10000l];
        if tiers.iter().any(|p| *p <= 0) {
            return Err("Todos los precios deben ser mayores a cero");
        }
        if tiers.iter().any(|p| *p > MAX_TIER_PRICE) {
            return Err("Los precios no pueden superar $10.000.000");
        }
        if tiers.windows(2).any(|w| w[1] < w[0]) {
            return Err("Los precios deben aumentar con el volumen");
        }
        Ok(())
    }

    /// Tier covering a requested volume: the smallest tier that holds it.
    pub fn price_for_amount(&self, amount_liters: i32) -> i32 {
        match amount_liters {
            a if a <= 100 => self.price_100l,
            a if a <= 1000 => self.price_1000l,
            a if a <= 5000 => self.price_5000l,
            _ => self.price_10000l,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankInfo {
    pub bank_name: String,
    pub account_type: String,
    pub account_number: String,
    pub rut: String,
}

impl BankInfo {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bank_name.trim().is_empty() || self.account_number.trim().is_empty() {
            return Err("Datos bancarios incompletos");
        }
        if !matches!(self.account_type.as_str(), "corriente" | "vista" | "ahorro" | "rut") {
            return Err("Tipo de cuenta inválido");
        }
        if !is_valid_rut(&self.rut) {
            return Err("RUT inválido");
        }
        Ok(())
    }
}

/// Validates a Chilean RUT ("12.345.678-5" or "12345678-5") with its mod-11 check digit.
pub fn is_valid_rut(rut: &str) -> bool {
    let clean: String = rut
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .collect::<String>()
        .to_uppercase();
    if clean.len() < 2 {
        return false;
    }
    let (body, dv) = clean.split_at(clean.len() - 1);
    if !body.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let mut sum = 0u32;
    let mut factor = 2u32;
    for c in body.chars().rev() {
        sum += c.to_digit(10).unwrap_or(0) * factor;
        factor = if factor == 7 { 2 } else { factor + 1 };
    }
    let expected = match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        n => char::from_digit(n, 10).unwrap_or('?'),
    };
    dv.starts_with(expected)
}

// Request/Response DTOs

#[derive(Debug, Deserialize)]
pub struct UpsertConsumerProfileRequest {
    pub full_name: String,
    pub phone: String,
    pub address: Option<String>,
    pub comuna_id: Option<String>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SupplierOnboardingRequest {
    pub full_name: String,
    pub phone: String,
    pub vehicle_type: String,
    pub vehicle_capacity: i32,
    pub pricing: PricingTiers,
    pub service_areas: Vec<String>,
    pub bank: Option<BankInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplierProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_capacity: Option<i32>,
    pub pricing: Option<PricingTiers>,
}

#[derive(Debug, Deserialize)]
pub struct SetServiceAreasRequest {
    pub comuna_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetAvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPushSubscriptionRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct UnregisterPushSubscriptionRequest {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> PricingTiers {
        PricingTiers {
            price_100l: 5_000,
            price_1000l: 20_000,
            price_5000l: 60_000,
            price_10000l: 100_000,
        }
    }

    #[test]
    fn price_for_amount_picks_smallest_covering_tier() {
        let t = tiers();
        assert_eq!(t.price_for_amount(100), 5_000);
        assert_eq!(t.price_for_amount(1000), 20_000);
        assert_eq!(t.price_for_amount(5000), 60_000);
        assert_eq!(t.price_for_amount(10000), 100_000);
    }

    #[test]
    fn pricing_must_be_positive_and_non_decreasing() {
        assert!(tiers().validate().is_ok());

        let mut t = tiers();
        t.price_5000l = 10_000;
        assert!(t.validate().is_err());

        let mut t = tiers();
        t.price_100l = 0;
        assert!(t.validate().is_err());
    }

    #[test]
    fn tier_prices_are_capped() {
        let mut t = tiers();
        t.price_10000l = 2_000_000_000;
        assert!(t.validate().is_err());

        t.price_10000l = MAX_TIER_PRICE;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn verification_workflow_transitions() {
        use VerificationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(MoreInfoNeeded));
        assert!(MoreInfoNeeded.can_transition_to(Pending));
        assert!(Approved.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Approved));
        assert!(Rejected.can_transition_to(Banned));

        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Banned.can_transition_to(Approved));
        assert!(!Banned.can_transition_to(Banned));
    }

    #[test]
    fn only_approved_suppliers_operate() {
        assert!(VerificationStatus::Approved.can_operate());
        assert!(!VerificationStatus::Suspended.can_operate());
        assert!(!VerificationStatus::Pending.can_operate());
    }

    #[test]
    fn rut_check_digit() {
        assert!(is_valid_rut("11.111.111-1"));
        assert!(is_valid_rut("12345678-5"));
        assert!(is_valid_rut("10000013-k"));
        assert!(!is_valid_rut("12345678-9"));
        assert!(!is_valid_rut("abc"));
        assert!(!is_valid_rut(""));
    }

    #[test]
    fn verification_status_round_trips_through_text() {
        let s: VerificationStatus = "more_info_needed".parse().unwrap();
        assert_eq!(s, VerificationStatus::MoreInfoNeeded);
        assert_eq!(s.to_string(), "more_info_needed");
        assert!("unknown".parse::<VerificationStatus>().is_err());
    }
}
