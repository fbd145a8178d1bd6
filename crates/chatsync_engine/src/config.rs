//! Configuration for the sync engine.

use chatsync_protocol::{RegisterOptions, ReleaseStage, ServerVersion};
use std::time::Duration;

/// First server version that serves recent private conversations in the
/// initial data, making the eager private-message fetch unnecessary.
pub const MIN_RECENT_PMS_SERVER_VERSION: &str = "2.1-dev-384-g4c3c669b41";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size for one message fetch.
    pub messages_per_request: u32,
    /// Absolute deadline for one resilient call, backoff included.
    pub request_long_timeout: Duration,
    /// Backoff between retries.
    pub backoff: BackoffConfig,
    /// Servers older than this get the recent private messages fetched eagerly.
    pub min_recent_pms_version: ServerVersion,
    /// Number of private messages fetched by the fallback.
    pub recent_private_messages_count: u32,
    /// Options for event registration.
    pub register: RegisterOptions,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            messages_per_request: 100,
            request_long_timeout: Duration::from_secs(60),
            backoff: BackoffConfig::default(),
            min_recent_pms_version: min_recent_pms_version(),
            recent_private_messages_count: 100,
            register: RegisterOptions::default(),
        }
    }

    /// Sets the page size.
    pub fn with_messages_per_request(mut self, count: u32) -> Self {
        self.messages_per_request = count;
        self
    }

    /// Sets the absolute deadline for resilient calls.
    pub fn with_request_long_timeout(mut self, timeout: Duration) -> Self {
        self.request_long_timeout = timeout;
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the version threshold for the private-message fallback.
    pub fn with_min_recent_pms_version(mut self, version: ServerVersion) -> Self {
        self.min_recent_pms_version = version;
        self
    }

    /// Sets how many private messages the fallback fetches.
    pub fn with_recent_private_messages_count(mut self, count: u32) -> Self {
        self.recent_private_messages_count = count;
        self
    }

    /// Sets the registration options.
    pub fn with_register_options(mut self, options: RegisterOptions) -> Self {
        self.register = options;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn min_recent_pms_version() -> ServerVersion {
    ServerVersion::from_parts(
        MIN_RECENT_PMS_SERVER_VERSION,
        (2, 1, 0),
        ReleaseStage::Dev { commits: 384 },
    )
}

/// Configuration for backoff between retries.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay cap for the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Draw each delay uniformly from `[0, cap]` instead of waiting the full cap.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Creates a backoff configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay cap for a given attempt (0-indexed), before jitter.
    pub fn cap_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(64) as i32;
        let cap = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(cap.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}
