//! Backoff schedule shared by every retryable call path.

use std::time::Duration;

const BASE: Duration = Duration::from_millis(500);
const CAP: Duration = Duration::from_secs(5);

/// Computes the delay before retry attempt `attempt` (1-based), with
/// exponential backoff capped at 5s and +-25% jitter.
pub(crate) fn backoff(attempt: u32) -> Duration {
    let exp = BASE.as_millis().saturating_mul(1u128 << attempt.min(8));
    let capped = exp.min(CAP.as_millis());
    let jitter_range = (capped / 4) as i128; // +-25%
    let jitter = rand::random::<i128>().rem_euclid(2 * jitter_range.max(1)) - jitter_range.max(1);
    let millis = (capped as i128 + jitter).max(0) as u64;
    Duration::from_millis(millis)
}

/// Maximum attempts for idempotent (GET) calls.
pub(crate) const MAX_GET_ATTEMPTS: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_jittered_cap() {
        for attempt in 0..10 {
            let delay = backoff(attempt);
            assert!(delay <= CAP + CAP / 4);
        }
    }

    #[test]
    fn backoff_grows_with_attempt_before_cap() {
        assert!(backoff(0) <= backoff(1) + Duration::from_millis(200));
    }
}
