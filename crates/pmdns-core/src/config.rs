//! Configuration types for the pmdns pipeline
//!
//! Durations are carried as integer seconds/milliseconds so the structures
//! serialize cleanly; use the accessor methods to get [`Duration`]s.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cache window for the registrar (one hour)
pub const DEFAULT_NAME_CACHE_TTL_SECS: u64 = 60 * 60;

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Interval between discovery polls (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound for a single discovery attempt (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Upper bound for a single registry update (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub update_timeout_secs: u64,

    /// How long a registered value is trusted before the same IP is pushed
    /// again (in seconds)
    ///
    /// Zero is replaced with [`DEFAULT_NAME_CACHE_TTL_SECS`].
    #[serde(default = "default_name_cache_ttl_secs")]
    pub name_cache_ttl_secs: u64,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Retry policy for the resilient caller
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_call_timeout_secs(),
            update_timeout_secs: default_call_timeout_secs(),
            name_cache_ttl_secs: default_name_cache_ttl_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            retry: RetryConfig::default(),
        }
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// Set the registrar cache window
    pub fn with_name_cache_ttl(mut self, ttl: Duration) -> Self {
        self.name_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("poll interval must be > 0"));
        }
        if self.poll_timeout_secs == 0 {
            return Err(crate::Error::config("poll timeout must be > 0"));
        }
        if self.update_timeout_secs == 0 {
            return Err(crate::Error::config("update timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event channel capacity must be > 0"));
        }
        self.retry.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    /// Effective cache window, with a non-positive value replaced by the default
    pub fn name_cache_ttl(&self) -> Duration {
        if self.name_cache_ttl_secs == 0 {
            Duration::from_secs(DEFAULT_NAME_CACHE_TTL_SECS)
        } else {
            Duration::from_secs(self.name_cache_ttl_secs)
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy for the resilient caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per call; zero or negative means unlimited
    ///
    /// Unlimited retries are still bounded by the caller's scope, which is
    /// always given a timeout by the pipeline.
    #[serde(default)]
    pub max_attempts: i32,

    /// Delay before the first retry (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Cap for the doubling delay (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Policy with a fixed attempt budget and the default backoff
    pub fn with_max_attempts(max_attempts: i32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.initial_delay_ms == 0 {
            return Err(crate::Error::config("retry initial delay must be > 0"));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(crate::Error::config(
                "retry max delay must be >= initial delay",
            ));
        }
        Ok(())
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_attempts <= 0
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5 * 60
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_name_cache_ttl_secs() -> u64 {
    DEFAULT_NAME_CACHE_TTL_SECS
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_initial_delay_ms() -> u64 {
    1
}

fn default_max_delay_ms() -> u64 {
    1000
}
