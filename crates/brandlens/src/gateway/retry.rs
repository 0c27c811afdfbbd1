use std::time::Duration;

use rand::Rng;

use crate::errors::GatewayError;

/// Bounded retry with full-jitter exponential backoff, applied around each
/// outbound call. Only transient upstream failures qualify; auth and
/// malformed-request errors propagate on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // stop_after_attempt(3), wait_random_exponential(min=1, max=20)
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Whether `attempt` (1-based) may be followed by another try.
    pub fn should_retry(&self, error: &GatewayError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Delay before the attempt following `attempt`: uniform in
    /// `[0, min(base * 2^(attempt-1), max)]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let ceiling = exp.min(self.max_delay);
        if ceiling.is_zero() {
            return ceiling;
        }
        let jittered = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_retry_until_exhausted() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&GatewayError::RateLimited, 1));
        assert!(policy.should_retry(&GatewayError::Upstream(503), 2));
        assert!(!policy.should_retry(&GatewayError::RateLimited, 3));
    }

    #[test]
    fn test_non_transient_errors_never_retry() {
        let policy = RetryPolicy::default();
        let rejected = GatewayError::Rejected {
            status: 400,
            body: "bad".to_string(),
        };
        assert!(!policy.should_retry(&rejected, 1));
        assert!(!policy.should_retry(&GatewayError::UnknownModel("x".to_string()), 1));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(100),
            Duration::from_millis(250),
        );
        for attempt in 1..=5 {
            assert!(policy.backoff(attempt) <= Duration::from_millis(250));
        }
    }
}
