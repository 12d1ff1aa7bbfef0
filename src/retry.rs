use std::time::Duration;

use rand::Rng;

/// Configuration for retry backoff on provider calls.
///
/// The coordinator drives the attempt loop itself (it has to compose
/// retries with cancellation and per-call timeouts), so this type only
/// owns the schedule: attempt cap and per-attempt delay with exponential
/// backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per provider (including the first one)
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
    /// Proportional jitter: 0.2 spreads each delay over +/-10%
    pub jitter: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Preset: provider attempts (3 attempts, delays ~500ms, ~1s)
    pub fn provider_call() -> Self {
        Self::new(3, Duration::from_millis(500)).with_max_delay(Duration::from_secs(5))
    }

    /// Delay before the given attempt (0-indexed; the first attempt never
    /// waits). Exponential in the attempt number, capped, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.max_delay.as_millis() as f64);
        let spread = rand::thread_rng().gen_range(-0.5..0.5) * self.jitter;
        let jittered = (capped * (1.0 + spread)).max(0.0);
        Duration::from_millis(jittered as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::provider_call()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_first_attempt_has_zero_delay() {
        let config = RetryConfig::provider_call();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_delays_grow_exponentially_within_jitter() {
        let config = RetryConfig::new(5, Duration::from_millis(100)).with_jitter(0.2);
        for attempt in 1..4u32 {
            let expected = 100.0 * 2f64.powi(attempt as i32 - 1);
            let delay = config.delay_for_attempt(attempt).as_millis() as f64;
            assert!(
                delay >= expected * 0.89 && delay <= expected * 1.11,
                "attempt {attempt}: {delay}ms vs base {expected}ms"
            );
        }
    }

    #[test]
    fn test_delay_respects_max() {
        let config = RetryConfig::new(10, Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(0.0);
        assert_eq!(config.delay_for_attempt(8), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let config = RetryConfig::new(4, Duration::from_millis(250)).with_jitter(0.0);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(1000));
    }
}
