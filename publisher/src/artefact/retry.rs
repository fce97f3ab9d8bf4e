//! Bounded polling policy for the eventually consistent store.
//!
//! Delays grow exponentially from `base_delay` up to `max_delay`. Jitter
//! takes up to half of that ceiling away again, so parallel fetches that have
//! all reached the cap still poll at different moments.

use apkrelay::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponent cap; `2^16` times any sane base delay already exceeds every ceiling.
const MAX_EXPONENT: u32 = 16;

/// How often and how patiently a fetch polls the store.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use apkrelay_publisher::artefact::retry::RetryPolicy;
///
/// let policy = RetryPolicy::bounded(3, Duration::from_millis(100), Duration::from_secs(1));
/// assert!(policy.allows_retry_after(2));
/// assert!(!policy.allows_retry_after(3));
/// assert_eq!(policy.backoff_ceiling(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that gives up after `max_attempts` attempts.
    #[must_use]
    pub const fn bounded(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_delay,
            max_delay,
        }
    }

    /// A policy that polls until cancelled.
    #[must_use]
    pub const fn unbounded(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay,
            max_delay,
        }
    }

    /// Policy for required variants.
    #[must_use]
    pub fn required(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Policy for optional variants; always bounded.
    #[must_use]
    pub fn optional(config: &RetryConfig) -> Self {
        Self::bounded(
            config.optional_max_attempts,
            config.base_delay(),
            config.max_delay(),
        )
    }

    /// The attempt cap, if any.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Returns true when another attempt may follow attempt number `attempt`
    /// (counted from one).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Deterministic delay before the retry that follows `attempt`, before
    /// jitter: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before the retry that follows `attempt`: somewhere between half
    /// the backoff ceiling and the ceiling itself.
    #[must_use]
    pub fn delay_after(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let spread = u64::try_from(ceiling.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rng.random_range(0..=spread));
        ceiling.saturating_sub(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy::bounded(5, Duration::from_millis(100), Duration::from_millis(1_000))
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    #[case(5, 1_000)]
    #[case(40, 1_000)]
    fn ceiling_doubles_until_capped(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(
            policy().backoff_ceiling(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[rstest]
    fn jitter_stays_between_half_ceiling_and_ceiling() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..10 {
            let ceiling = policy().backoff_ceiling(attempt);
            let delay = policy().delay_after(attempt, &mut rng);
            assert!(delay >= ceiling / 2, "{delay:?} below half of {ceiling:?}");
            assert!(delay <= ceiling, "{delay:?} above {ceiling:?}");
        }
    }

    #[rstest]
    fn capped_delays_still_spread_out() {
        let mut rng = StdRng::seed_from_u64(11);
        let delays: std::collections::BTreeSet<_> = (0..32)
            .map(|_| policy().delay_after(40, &mut rng))
            .collect();
        assert!(delays.len() > 1, "every capped delay was {delays:?}");
        assert!(delays.iter().all(|delay| *delay <= Duration::from_millis(1_000)));
    }

    #[rstest]
    fn zero_base_delay_never_sleeps() {
        let policy = RetryPolicy::bounded(3, Duration::ZERO, Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.delay_after(2, &mut rng), Duration::ZERO);
    }

    #[rstest]
    fn unbounded_policy_always_allows_a_retry() {
        let policy = RetryPolicy::unbounded(Duration::ZERO, Duration::ZERO);
        assert!(policy.allows_retry_after(u32::MAX - 1));
        assert_eq!(policy.max_attempts(), None);
    }

    #[rstest]
    fn optional_policy_is_bounded_even_when_required_is_not() {
        let config = RetryConfig::default();
        assert_eq!(RetryPolicy::required(&config).max_attempts(), None);
        assert_eq!(
            RetryPolicy::optional(&config).max_attempts(),
            Some(config.optional_max_attempts)
        );
    }
}
