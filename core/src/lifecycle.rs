//! Booking status graph.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED ──pay──▶ CONFIRMED ──complete──▶ COMPLETED
//!    │  └──reject──▶ REJECTED      │            │
//!    │                              │            └──cancel──▶ CANCELLED
//!    ├──cancel──▶ CANCELLED ◀──cancel┘
//!    └──pay (intent methods only)──▶ CONFIRMED
//! ```
//!
//! Every operation that moves a booking checks [`Transition::apply`]; nothing
//! else in the crate encodes the edges.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PaymentMethod;

/// Server-side lifecycle status of a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Requested, awaiting the driver
    Pending,
    /// Accepted by the driver, awaiting payment
    Approved,
    /// Declined by the driver
    Rejected,
    /// Paid; seats are held
    Confirmed,
    /// Withdrawn by passenger or driver
    Cancelled,
    /// Ride finished
    Completed,
}

impl BookingStatus {
    /// All statuses
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Confirmed,
        Self::Cancelled,
        Self::Completed,
    ];

    /// Terminal statuses have no outgoing edges
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }

    /// Whether `self → next` is an edge of the graph for a booking paid with `method`
    ///
    /// `PENDING → CONFIRMED` exists only for intent-based methods, where the
    /// charge is captured at booking time and replaces driver approval.
    #[must_use]
    pub const fn can_transition_to(self, next: Self, method: PaymentMethod) -> bool {
        match (self, next) {
            (Self::Pending, Self::Approved | Self::Rejected | Self::Cancelled)
            | (Self::Approved, Self::Confirmed | Self::Cancelled)
            | (Self::Confirmed, Self::Completed | Self::Cancelled) => true,
            (Self::Pending, Self::Confirmed) => method.requires_intent(),
            _ => false,
        }
    }

    /// Whether `later` is reachable from `self` through one or more edges
    ///
    /// The graph is acyclic, so a status never leads to itself.
    #[must_use]
    pub fn leads_to(self, later: Self, method: PaymentMethod) -> bool {
        Self::ALL.iter().any(|&next| {
            self.can_transition_to(next, method)
                && (next == later || next.leads_to(later, method))
        })
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// A driver's answer to a booking request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Accept the passenger
    Approved,
    /// Decline the passenger
    Rejected,
}

impl Decision {
    /// Transition this decision performs
    #[must_use]
    pub const fn transition(self) -> Transition {
        match self {
            Self::Approved => Transition::Approve,
            Self::Rejected => Transition::Reject,
        }
    }

    /// Query-string value expected by the backend
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// A requested move through the graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Driver approves
    Approve,
    /// Driver rejects
    Reject,
    /// Passenger or driver cancels
    Cancel,
    /// Payment confirmed (cash settlement or processor confirmation)
    ConfirmPayment,
    /// Ride completed
    Complete,
}

impl Transition {
    /// Status reached when the transition succeeds
    #[must_use]
    pub const fn target(self) -> BookingStatus {
        match self {
            Self::Approve => BookingStatus::Approved,
            Self::Reject => BookingStatus::Rejected,
            Self::Cancel => BookingStatus::Cancelled,
            Self::ConfirmPayment => BookingStatus::Confirmed,
            Self::Complete => BookingStatus::Completed,
        }
    }

    /// Validate the transition from `from` for a booking paid with `method`
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] when the graph has no such edge. A
    /// no-op (target equal to `from`) is illegal.
    pub const fn apply(
        self,
        from: BookingStatus,
        method: PaymentMethod,
    ) -> Result<BookingStatus, IllegalTransition> {
        let target = self.target();
        if from.can_transition_to(target, method) {
            Ok(target)
        } else {
            Err(IllegalTransition {
                from,
                transition: self,
            })
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::ConfirmPayment => "confirm payment for",
            Self::Complete => "complete",
        };
        f.write_str(verb)
    }
}

/// A transition the graph does not allow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IllegalTransition {
    /// Current status
    pub from: BookingStatus,
    /// Attempted transition
    pub transition: Transition,
}
