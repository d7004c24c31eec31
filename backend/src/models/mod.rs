pub mod admin;
pub mod auth;
pub mod comuna;
pub mod commission;
pub mod dispute;
pub mod document;
pub mod notification;
pub mod offer;
pub mod profile;
pub mod rating;
pub mod request;
pub mod settings;

/// `LIMIT`/`OFFSET` pair for a 1-based `page` query parameter. `per_page`
/// falls back to `default` and is clamped to `1..=max`.
pub fn page_bounds(page: Option<i64>, per_page: Option<i64>, default: i64, max: i64) -> (i64, i64) {
    let per_page = per_page.unwrap_or(default).clamp(1, max);
    let offset = page.unwrap_or(1).max(1).saturating_sub(1).saturating_mul(per_page);
    (per_page, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_starts_at_zero() {
        assert_eq!(page_bounds(None, None, 20, 100), (20, 0));
        assert_eq!(page_bounds(Some(0), Some(10), 20, 100), (10, 0));
        assert_eq!(page_bounds(Some(-5), None, 20, 100), (20, 0));
        assert_eq!(page_bounds(Some(3), Some(10), 20, 100), (10, 20));
    }

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(page_bounds(Some(1), Some(1_000), 20, 100).0, 100);
        assert_eq!(page_bounds(Some(1), Some(0), 20, 100).0, 1);
    }

    #[test]
    fn huge_page_saturates() {
        let (per_page, offset) = page_bounds(Some(i64::MAX), Some(100), 20, 100);
        assert_eq!(per_page, 100);
        assert_eq!(offset, i64::MAX);
    }
}
