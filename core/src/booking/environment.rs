//! Collaborators injected into the booking reducer.

use std::sync::Arc;

use crate::environment::Clock;
use crate::gateway::BookingGateway;
use crate::session::SessionStore;

/// Environment for [`BookingReducer`](super::BookingReducer)
#[derive(Clone)]
pub struct BookingEnvironment {
    gateway: Arc<dyn BookingGateway>,
    session: SessionStore,
    clock: Arc<dyn Clock>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(
        gateway: Arc<dyn BookingGateway>,
        session: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            session,
            clock,
        }
    }

    /// Backend gateway
    #[must_use]
    pub fn gateway(&self) -> Arc<dyn BookingGateway> {
        Arc::clone(&self.gateway)
    }

    /// Session store
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Clock
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl std::fmt::Debug for BookingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEnvironment")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
