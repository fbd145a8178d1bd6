//! Backoff scheduler for retry loops.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Produces increasing waits for repeated attempts of one logical operation.
///
/// Each call to [`Backoff::wait`] sleeps for the next interval: the cap
/// grows exponentially up to `max_delay`, and with jitter enabled the actual
/// wait is drawn uniformly from `[0, cap]`. A fresh instance starts its
/// sequence over.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff at the start of its sequence.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of waits taken so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Returns the next delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let cap = self.config.cap_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        if self.config.jitter && !cap.is_zero() {
            rand::thread_rng().gen_range(Duration::ZERO..=cap)
        } else {
            cap
        }
    }

    /// Sleeps for the next delay without blocking other tasks.
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        debug!(attempt = self.attempt, ?delay, "backing off");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn fixed(initial_ms: u64, max_ms: u64) -> BackoffConfig {
        BackoffConfig::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
        )
        .with_jitter(false)
    }

    #[test]
    fn delays_increase_until_ceiling() {
        let mut backoff = Backoff::new(fixed(100, 500));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn fresh_instance_restarts_sequence() {
        let config = fixed(50, 10_000);
        let mut first = Backoff::new(config.clone());
        first.next_delay();
        first.next_delay();

        let mut second = Backoff::new(config);
        assert_eq!(second.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn jittered_delay_stays_within_cap() {
        let config = BackoffConfig::new(Duration::from_millis(100), Duration::from_secs(10));
        let mut backoff = Backoff::new(config.clone());
        for attempt in 0..12 {
            let delay = backoff.next_delay();
            assert!(delay <= config.cap_for_attempt(attempt));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_suspends_for_the_delay() {
        let mut backoff = Backoff::new(fixed(250, 1_000));
        let start = Instant::now();
        backoff.wait().await;
        backoff.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(750));
        assert!(elapsed < Duration::from_millis(760));
    }
}
