//! # Triply Testing
//!
//! Test doubles and helpers for the Triply booking client.
//!
//! This crate provides:
//! - [`MockGateway`]: an in-memory backend enforcing the server's booking rules
//! - [`ScriptedPaymentWidget`]: a payment widget with scripted outcomes
//! - [`FixedClock`]: deterministic time
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`fixtures`]: canned identities and rides
//! - [`properties`]: proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use triply_core::session::SessionStore;
//! use triply_runtime::{BookingCoordinator, CoordinatorConfig};
//! use triply_testing::{MockGateway, fixtures};
//!
//! #[tokio::test]
//! async fn test_cash_booking() {
//!     let session = SessionStore::signed_in(fixtures::passenger());
//!     let gateway = MockGateway::new(session.clone()).with_ride(fixtures::ride(42, 3));
//!     let coordinator = BookingCoordinator::new(Arc::new(gateway), session, CoordinatorConfig::default());
//!
//!     let outcome = coordinator
//!         .request_booking(RideId::new(42), 2, PaymentMethod::Cash, None)
//!         .await?;
//!     assert_eq!(outcome.booking().status, BookingStatus::Pending);
//! }
//! ```

use chrono::{DateTime, Utc};
use triply_core::environment::Clock;

pub mod fixtures;
pub mod gateway;
pub mod properties;
pub mod reducer_test;
pub mod widget;

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use triply_testing::mocks::FixedClock;
    /// use triply_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Fixed clock set to the morning of the fixture rides (2025-03-14 06:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        let time = DateTime::parse_from_rfc3339("2025-03-14T06:00:00Z")
            .map(|time| time.with_timezone(&Utc))
            .unwrap_or_default();
        FixedClock::new(time)
    }
}

/// Install a test subscriber honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use gateway::{Endpoint, MockGateway};
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions, execute};
pub use widget::ScriptedPaymentWidget;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-03-14T06:00:00+00:00");
    }
}
