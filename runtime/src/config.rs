//! Coordinator configuration loaded from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Timeouts, polling and retry settings for [`BookingCoordinator`](crate::BookingCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long an operation waits for its result, in seconds (default: 30)
    pub action_timeout_secs: u64,
    /// Notification polling interval in seconds (default: 60)
    pub notification_poll_secs: u64,
    /// Confirmation retries after a transient failure (default: 3)
    pub confirm_max_retries: usize,
    /// Delay before the first confirmation retry, in milliseconds (default: 500)
    pub confirm_initial_delay_ms: u64,
    /// Graceful shutdown timeout in seconds (default: 10)
    pub shutdown_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: 30,
            notification_poll_secs: 60,
            confirm_max_retries: 3,
            confirm_initial_delay_ms: 500,
            shutdown_timeout_secs: 10,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// Reads `TRIPLY_ACTION_TIMEOUT_SECS`, `TRIPLY_NOTIFICATION_POLL_SECS`,
    /// `TRIPLY_CONFIRM_MAX_RETRIES`, `TRIPLY_CONFIRM_INITIAL_DELAY_MS` and
    /// `TRIPLY_SHUTDOWN_TIMEOUT_SECS`. Unparseable values use the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            action_timeout_secs: env::var("TRIPLY_ACTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.action_timeout_secs),
            notification_poll_secs: env::var("TRIPLY_NOTIFICATION_POLL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.notification_poll_secs),
            confirm_max_retries: env::var("TRIPLY_CONFIRM_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confirm_max_retries),
            confirm_initial_delay_ms: env::var("TRIPLY_CONFIRM_INITIAL_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confirm_initial_delay_ms),
            shutdown_timeout_secs: env::var("TRIPLY_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.shutdown_timeout_secs),
        }
    }

    /// Override the operation timeout
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout_secs = timeout.as_secs();
        self
    }

    /// Override the notification polling interval
    #[must_use]
    pub const fn with_notification_interval(mut self, interval: Duration) -> Self {
        self.notification_poll_secs = interval.as_secs();
        self
    }

    /// Override confirmation retry settings
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // delays far below u64::MAX ms
    pub const fn with_confirm_retries(mut self, max_retries: usize, initial_delay: Duration) -> Self {
        self.confirm_max_retries = max_retries;
        self.confirm_initial_delay_ms = initial_delay.as_millis() as u64;
        self
    }

    /// Override the shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Operation timeout
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Notification polling interval, never zero
    #[must_use]
    pub const fn notification_interval(&self) -> Duration {
        if self.notification_poll_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.notification_poll_secs)
        }
    }

    /// Graceful shutdown timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Backoff policy for payment confirmation
    #[must_use]
    pub fn confirm_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.confirm_max_retries)
            .initial_delay(Duration::from_millis(self.confirm_initial_delay_ms))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.action_timeout(), Duration::from_secs(30));
        assert_eq!(config.notification_interval(), Duration::from_secs(60));
        assert_eq!(config.confirm_policy().max_retries, 3);
        assert_eq!(config.confirm_policy().initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_builders_override() {
        let config = CoordinatorConfig::default()
            .with_action_timeout(Duration::from_secs(5))
            .with_notification_interval(Duration::from_secs(2))
            .with_confirm_retries(1, Duration::from_millis(10));

        assert_eq!(config.action_timeout_secs, 5);
        assert_eq!(config.notification_poll_secs, 2);
        assert_eq!(config.confirm_policy().max_retries, 1);
        assert_eq!(config.confirm_policy().initial_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = CoordinatorConfig::default().with_notification_interval(Duration::ZERO);
        assert_eq!(config.notification_interval(), Duration::from_secs(1));
    }
}
