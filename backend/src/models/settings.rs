use serde::{Deserialize, Serialize};

/// Upper bound for the hour-based deadlines (one year).
pub const MAX_DEADLINE_HOURS: i64 = 24 * 365;
/// Upper bound for offer validity (one day).
pub const MAX_OFFER_VALIDITY_MINUTES: i64 = 24 * 60;

/// Platform settings editable from the admin dashboard.
///
/// Stored one key per row in `admin_settings`; keys missing from the table
/// fall back to these defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSettings {
    pub default_commission_percent: f64,
    /// Offer validity bounds, in minutes
    pub offer_validity_min: i64,
    pub offer_validity_default: i64,
    pub offer_validity_max: i64,
    pub dispute_window_hours: i64,
    /// Pending requests without offers after this long become `no_offers`
    pub request_timeout_hours: i64,
    pub urgency_surcharge_percent: f64,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            default_commission_percent: 15.0,
            offer_validity_min: 15,
            offer_validity_default: 30,
            offer_validity_max: 120,
            dispute_window_hours: 48,
            request_timeout_hours: 4,
            urgency_surcharge_percent: 10.0,
        }
    }
}

impl PlatformSettings {
    /// Overlays stored `(key, value)` rows on the defaults. Unknown keys and
    /// values of the wrong type are ignored.
    pub fn from_rows(rows: &[(String, serde_json::Value)]) -> Self {
        let mut s = Self::default();
        for (key, value) in rows {
            match key.as_str() {
                "default_commission_percent" => {
                    if let Some(v) = value.as_f64() {
                        s.default_commission_percent = v;
                    }
                }
                "offer_validity_min" => {
                    if let Some(v) = value.as_i64() {
                        s.offer_validity_min = v;
                    }
                }
                "offer_validity_default" => {
                    if let Some(v) = value.as_i64() {
                        s.offer_validity_default = v;
                    }
                }
                "offer_validity_max" => {
                    if let Some(v) = value.as_i64() {
                        s.offer_validity_max = v;
                    }
                }
                "dispute_window_hours" => {
                    if let Some(v) = value.as_i64() {
                        s.dispute_window_hours = v;
                    }
                }
                "request_timeout_hours" => {
                    if let Some(v) = value.as_i64() {
                        s.request_timeout_hours = v;
                    }
                }
                "urgency_surcharge_percent" => {
                    if let Some(v) = value.as_f64() {
                        s.urgency_surcharge_percent = v;
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_rows(&self) -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("default_commission_percent", self.default_commission_percent.into()),
            ("offer_validity_min", self.offer_validity_min.into()),
            ("offer_validity_default", self.offer_validity_default.into()),
            ("offer_validity_max", self.offer_validity_max.into()),
            ("dispute_window_hours", self.dispute_window_hours.into()),
            ("request_timeout_hours", self.request_timeout_hours.into()),
            ("urgency_surcharge_percent", self.urgency_surcharge_percent.into()),
        ]
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=100.0).contains(&self.default_commission_percent) {
            return Err("La comisión debe estar entre 0 y 100");
        }
        if !(0.0..=100.0).contains(&self.urgency_surcharge_percent) {
            return Err("El recargo por urgencia debe estar entre 0 y 100");
        }
        if self.offer_validity_min <= 0 {
            return Err("La validez mínima debe ser positiva");
        }
        if self.offer_validity_min > self.offer_validity_default
            || self.offer_validity_default > self.offer_validity_max
        {
            return Err("La validez debe cumplir mínimo ≤ predeterminado ≤ máximo");
        }
        if self.offer_validity_max > MAX_OFFER_VALIDITY_MINUTES {
            return Err("La validez máxima no puede superar 24 horas");
        }
        if self.dispute_window_hours <= 0 || self.request_timeout_hours <= 0 {
            return Err("Los plazos deben ser positivos");
        }
        if self.dispute_window_hours > MAX_DEADLINE_HOURS
            || self.request_timeout_hours > MAX_DEADLINE_HOURS
        {
            return Err("Los plazos no pueden superar un año");
        }
        Ok(())
    }

    /// Commission applying to a supplier: its override or the platform default.
    pub fn commission_for(&self, commission_override: Option<f64>) -> f64 {
        commission_override.unwrap_or(self.default_commission_percent)
    }
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub default_commission_percent: Option<f64>,
    pub offer_validity_min: Option<i64>,
    pub offer_validity_default: Option<i64>,
    pub offer_validity_max: Option<i64>,
    pub dispute_window_hours: Option<i64>,
    pub request_timeout_hours: Option<i64>,
    pub urgency_surcharge_percent: Option<f64>,
}

impl UpdateSettingsRequest {
    pub fn apply_to(&self, current: &PlatformSettings) -> PlatformSettings {
        PlatformSettings {
            default_commission_percent: self
                .default_commission_percent
                .unwrap_or(current.default_commission_percent),
            offer_validity_min: self.offer_validity_min.unwrap_or(current.offer_validity_min),
            offer_validity_default: self
                .offer_validity_default
                .unwrap_or(current.offer_validity_default),
            offer_validity_max: self.offer_validity_max.unwrap_or(current.offer_validity_max),
            dispute_window_hours: self
                .dispute_window_hours
                .unwrap_or(current.dispute_window_hours),
            request_timeout_hours: self
                .request_timeout_hours
                .unwrap_or(current.request_timeout_hours),
            urgency_surcharge_percent: self
                .urgency_surcharge_percent
                .unwrap_or(current.urgency_surcharge_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_overlay_defaults() {
        let rows = vec![
            ("default_commission_percent".to_string(), json!(12.5)),
            ("dispute_window_hours".to_string(), json!(72)),
            ("offer_validity_max".to_string(), json!("not a number")),
            ("unknown_key".to_string(), json!(1)),
        ];
        let s = PlatformSettings::from_rows(&rows);
        assert_eq!(s.default_commission_percent, 12.5);
        assert_eq!(s.dispute_window_hours, 72);
        assert_eq!(s.offer_validity_max, 120);
        assert_eq!(s.request_timeout_hours, 4);
    }

    #[test]
    fn integer_commission_row_is_accepted() {
        let rows = vec![("default_commission_percent".to_string(), json!(10))];
        assert_eq!(PlatformSettings::from_rows(&rows).default_commission_percent, 10.0);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(PlatformSettings::default().validate().is_ok());
    }

    #[test]
    fn validity_bounds_must_be_ordered() {
        let update = UpdateSettingsRequest {
            offer_validity_default: Some(200),
            ..Default::default()
        };
        let s = update.apply_to(&PlatformSettings::default());
        assert!(s.validate().is_err());
    }

    #[test]
    fn commission_outside_range_rejected() {
        let update = UpdateSettingsRequest {
            default_commission_percent: Some(120.0),
            ..Default::default()
        };
        assert!(update.apply_to(&PlatformSettings::default()).validate().is_err());
    }

    #[test]
    fn deadlines_are_capped() {
        let defaults = PlatformSettings::default();
        let huge_timeout = UpdateSettingsRequest {
            request_timeout_hours: Some(10_000_000_000_000),
            ..Default::default()
        };
        assert!(huge_timeout.apply_to(&defaults).validate().is_err());

        let huge_window = UpdateSettingsRequest {
            dispute_window_hours: Some(MAX_DEADLINE_HOURS + 1),
            ..Default::default()
        };
        assert!(huge_window.apply_to(&defaults).validate().is_err());

        let one_year = UpdateSettingsRequest {
            dispute_window_hours: Some(MAX_DEADLINE_HOURS),
            request_timeout_hours: Some(MAX_DEADLINE_HOURS),
            ..Default::default()
        };
        assert!(one_year.apply_to(&defaults).validate().is_ok());
    }

    #[test]
    fn validity_is_capped_at_one_day() {
        let update = UpdateSettingsRequest {
            offer_validity_max: Some(MAX_OFFER_VALIDITY_MINUTES + 1),
            ..Default::default()
        };
        assert!(update.apply_to(&PlatformSettings::default()).validate().is_err());
    }

    #[test]
    fn override_wins_over_default() {
        let s = PlatformSettings::default();
        assert_eq!(s.commission_for(None), 15.0);
        assert_eq!(s.commission_for(Some(8.0)), 8.0);
    }

    #[test]
    fn to_rows_round_trips() {
        let s = PlatformSettings {
            dispute_window_hours: 24,
            ..Default::default()
        };
        let rows: Vec<(String, serde_json::Value)> = s
            .to_rows()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(PlatformSettings::from_rows(&rows), s);
    }
}
