//! # Triply Core
//!
//! Booking lifecycle state machine and domain types for the Triply
//! ride-sharing client.
//!
//! The crate follows the reducer architecture:
//!
//! - **State**: the local read model of bookings, rides and in-flight operations
//! - **Action**: commands issued by the presentation layer and the results
//!   reported back by effects
//! - **Reducer**: validates commands against the booking transition graph,
//!   updates state and describes the network calls to make
//! - **Effect**: side effect descriptions, executed by `triply-runtime`
//! - **Environment**: injected collaborators (gateway, session, clock)
//!
//! The backend stays authoritative: local state changes only from server
//! responses, never optimistically.
//!
//! ## Example
//!
//! ```ignore
//! use triply_core::booking::{BookingAction, BookingReducer, BookingState};
//! use triply_core::reducer::Reducer;
//!
//! let mut state = BookingState::default();
//! let effects = BookingReducer::new().reduce(
//!     &mut state,
//!     BookingAction::RequestBooking { correlation_id, ride, seats: 2, payment_method, locations: None },
//!     &env,
//! );
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub mod booking;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod payment;
pub mod session;
pub mod types;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// All I/O is described as [`Effect`](crate::effect::Effect) values and run by the store.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Validates the action, updates state in place and returns the
        /// effects the runtime must execute.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values describing work for the runtime. The reducer never
/// performs I/O itself.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Side effect description returned by reducers
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action: Send + 'static> Effect<Action> {
        /// Wrap an async computation that always yields an action
        #[must_use]
        pub fn task<F>(future: F) -> Self
        where
            F: Future<Output = Action> + Send + 'static,
        {
            Effect::Future(Box::pin(async move { Some(future.await) }))
        }

        /// Feed an action straight back into the store
        ///
        /// Used for results the reducer can settle without I/O (local
        /// validation failures, idempotent hits) so waiters still observe them.
        #[must_use]
        pub fn emit(action: Action) -> Self {
            Effect::Future(Box::pin(async move { Some(action) }))
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
