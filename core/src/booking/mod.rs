//! Booking lifecycle coordination.
//!
//! # Architecture
//!
//! ```text
//! BookingCoordinator ──command──▶ BookingReducer
//!                                   │ validates against the transition graph
//!                                   │ marks the booking InFlight
//!                                   ▼
//!                             Effect::Future ──▶ BookingGateway (REST)
//!                                   │
//!        result action (BookingUpdated / CommandFailed / ...) ◀──┘
//!                                   │
//!                                   ▼
//!                   BookingReducer reconciles the read model
//! ```
//!
//! Commands carry a [`CorrelationId`](crate::types::CorrelationId); every
//! command is settled by exactly one result action carrying the same id, so
//! callers can wait for it with `Store::send_and_wait_for`.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod types;

pub use actions::{BookingAction, Target};
pub use environment::BookingEnvironment;
pub use reducer::BookingReducer;
pub use types::{BookingEntry, BookingFlow, BookingState, Operation};
