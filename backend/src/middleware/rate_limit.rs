use crate::error::AppError;

/// Checks a counter-based rate limit stored in Redis.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for `key`
/// - On first increment, sets TTL to `window_secs`
/// - Returns `RateLimited` once the counter exceeds `max_attempts`
///
/// A Redis outage lets the request through.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> Result<(), AppError> {
    let count: u64 = redis::cmd("INCR")
        .arg(key)
        .query_async(redis)
        .await
        .unwrap_or(0);

    if count == 1 {
        // Set TTL only on first increment to avoid resetting the window on each attempt
        let _: Result<(), _> = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await;
    }

    if exceeds(count, max_attempts) {
        tracing::warn!("Rate limit hit for {}", key);
        return Err(AppError::RateLimited);
    }

    Ok(())
}

/// Redis key for the guest request limit, keyed on the normalized email.
pub fn guest_request_key(email: &str) -> String {
    format!("rate:guest_request:{}", email.trim().to_lowercase())
}

fn exceeds(count: u64, max_attempts: u64) -> bool {
    count > max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_inclusive() {
        assert!(!exceeds(5, 5));
        assert!(exceeds(6, 5));
        assert!(!exceeds(0, 5));
    }

    #[test]
    fn guest_key_normalizes_email() {
        assert_eq!(
            guest_request_key("  Maria@Example.CL "),
            "rate:guest_request:maria@example.cl"
        );
    }
}
