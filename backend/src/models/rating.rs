use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub request_id: Uuid,
    pub consumer_id: Uuid,
    pub provider_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRatingRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

impl SubmitRatingRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(1..=5).contains(&self.rating) {
            return Err("La calificación debe estar entre 1 y 5");
        }
        if self
            .comment
            .as_deref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
        {
            return Err("El comentario no puede superar 500 caracteres");
        }
        Ok(())
    }

    /// Blank comments are stored as NULL.
    pub fn normalized_comment(&self) -> Option<String> {
        self.comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_range() {
        for r in 1..=5 {
            assert!(SubmitRatingRequest { rating: r, comment: None }.validate().is_ok());
        }
        assert!(SubmitRatingRequest { rating: 0, comment: None }.validate().is_err());
        assert!(SubmitRatingRequest { rating: 6, comment: None }.validate().is_err());
    }

    #[test]
    fn comment_length_counts_chars() {
        let ok = "ñ".repeat(500);
        assert!(SubmitRatingRequest { rating: 5, comment: Some(ok) }.validate().is_ok());
        let too_long = "a".repeat(501);
        assert!(SubmitRatingRequest { rating: 5, comment: Some(too_long) }.validate().is_err());
    }

    #[test]
    fn blank_comment_is_dropped() {
        let req = SubmitRatingRequest { rating: 4, comment: Some("   ".into()) };
        assert_eq!(req.normalized_comment(), None);
        let req = SubmitRatingRequest { rating: 4, comment: Some(" Muy puntual ".into()) };
        assert_eq!(req.normalized_comment().as_deref(), Some("Muy puntual"));
    }
}
