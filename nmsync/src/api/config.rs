//! Transport configuration.

use std::time::Duration;

use crate::types::constants::timeouts;

/// Timeouts applied to every call the D-Bus transport makes.
///
/// A mirrored object must never wait forever on the bus: property reads,
/// settings reads, and signal subscriptions are each raced against one of
/// these durations and fail with [`MirrorError::Timeout`](crate::MirrorError::Timeout)
/// when it elapses.
///
/// # Example
///
/// ```rust
/// use nmsync::TimeoutConfig;
/// use std::time::Duration;
///
/// let config = TimeoutConfig::new()
///     .with_read_timeout(Duration::from_secs(2))
///     .with_subscribe_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.read_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Limit for `GetAll` and `GetSettings` calls.
    pub read_timeout: Duration,
    /// Limit for setting up a `PropertiesChanged` subscription.
    pub subscribe_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_timeout: timeouts::read_timeout(),
            subscribe_timeout: timeouts::subscribe_timeout(),
        }
    }
}

impl TimeoutConfig {
    /// Creates a configuration with the default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout for property and settings reads.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the timeout for signal subscriptions.
    #[must_use]
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }
}
