//! Retry backoff schedule.

use std::time::Duration;

/// Delay before the next attempt after `attempts` failures.
///
/// Doubles per failure starting from `base`, saturating at `cap`.
#[must_use]
pub fn backoff_delay(attempts: u32, base: Duration, cap: Duration) -> Duration {
    let shift = attempts.min(31);
    base.saturating_mul(1u32 << shift).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(60);
        let cap = Duration::from_secs(3600);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_secs(60));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(120));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(240));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(480));
    }

    #[test]
    fn saturates_at_cap() {
        let base = Duration::from_secs(60);
        let cap = Duration::from_secs(3600);
        assert_eq!(backoff_delay(6, base, cap), cap);
        assert_eq!(backoff_delay(31, base, cap), cap);
        assert_eq!(backoff_delay(u32::MAX, base, cap), cap);
    }

    #[test]
    fn is_monotonic_up_to_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(600);
        let mut last = Duration::ZERO;
        for attempts in 0..16 {
            let delay = backoff_delay(attempts, base, cap);
            assert!(delay >= last);
            last = delay;
        }
    }
}
