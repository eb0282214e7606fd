//! Local read model for bookings and rides.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::BookingError;
use crate::lifecycle::{BookingStatus, Decision};
use crate::payment::PaymentIntent;
use crate::types::{Booking, BookingId, CorrelationId, Ride, RideId, UserId};

/// Mutating operation currently awaiting the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Driver response
    Respond(Decision),
    /// Cancellation
    Cancel,
    /// Direct cash settlement
    SettleCash,
    /// Intent creation
    InitiatePayment,
    /// Server confirmation of a processor payment
    ConfirmPayment {
        /// Intent being confirmed
        payment_intent_id: String,
    },
}

/// Where a booking stands in the client-side flow
///
/// Replaces loose "current booking / client secret / status" flags: each
/// variant carries exactly the data valid in that phase.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum BookingFlow {
    /// Nothing pending locally; the booking mirrors the server
    #[default]
    Idle,
    /// A mutating call is in flight
    InFlight {
        /// What is being done
        operation: Operation,
        /// Command that started it
        correlation_id: CorrelationId,
        /// Flow to restore if the call fails
        resume: Box<BookingFlow>,
    },
    /// An intent is live and waiting for the payment widget
    AwaitingPayment {
        /// The live intent
        intent: PaymentIntent,
    },
    /// The processor charged the passenger but the server never acknowledged it
    ReconciliationPending {
        /// Intent that was charged
        payment_intent_id: String,
    },
    /// Server confirmed a processor payment
    Paid {
        /// Confirmed intent
        payment_intent_id: String,
    },
}

impl BookingFlow {
    /// Whether a mutating call is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }

    /// The live intent, including while a call on top of it is in flight
    #[must_use]
    pub fn live_intent(&self) -> Option<&PaymentIntent> {
        match self {
            Self::AwaitingPayment { intent } => Some(intent),
            Self::InFlight { resume, .. } => resume.live_intent(),
            _ => None,
        }
    }

    /// Intent charged but unacknowledged, including during a retry
    #[must_use]
    pub fn unreconciled_intent(&self) -> Option<&str> {
        match self {
            Self::ReconciliationPending { payment_intent_id } => Some(payment_intent_id),
            Self::InFlight { resume, .. } => resume.unreconciled_intent(),
            _ => None,
        }
    }
}

/// A booking with its local flow
#[derive(Clone, Debug, PartialEq)]
pub struct BookingEntry {
    /// Last server snapshot
    pub booking: Booking,
    /// Client-side flow
    pub flow: BookingFlow,
    /// Most recent failure, cleared by the next server update
    pub last_error: Option<BookingError>,
    /// When the entry last changed
    pub updated_at: DateTime<Utc>,
}

/// Local read model
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// Bookings by ID
    pub bookings: BTreeMap<BookingId, BookingEntry>,
    /// Ride snapshots from search results, with local seat accounting
    pub rides: BTreeMap<RideId, Ride>,
    /// Booking requests awaiting the server, by ride
    pub requests_in_flight: HashMap<RideId, CorrelationId>,
    /// Ride completion calls awaiting the server, by ride
    pub completing_rides: HashMap<RideId, CorrelationId>,
}

impl BookingState {
    /// Creates an empty `BookingState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Booking snapshot by ID
    #[must_use]
    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.get(&id).map(|entry| &entry.booking)
    }

    /// Flow of a booking
    #[must_use]
    pub fn flow(&self, id: BookingId) -> Option<&BookingFlow> {
        self.bookings.get(&id).map(|entry| &entry.flow)
    }

    /// Whether controls for this booking should be disabled
    #[must_use]
    pub fn is_busy(&self, id: BookingId) -> bool {
        self.bookings.get(&id).is_some_and(|entry| entry.flow.is_busy())
    }

    /// Ride snapshot by ID
    #[must_use]
    pub fn ride(&self, id: RideId) -> Option<&Ride> {
        self.rides.get(&id)
    }

    /// A booking on `ride` stuck in the reconciliation gap
    #[must_use]
    pub fn unreconciled_on_ride(&self, ride: RideId) -> Option<(BookingId, &str)> {
        self.bookings.values().find_map(|entry| {
            if entry.booking.ride.id != ride {
                return None;
            }
            entry
                .flow
                .unreconciled_intent()
                .map(|intent| (entry.booking.id, intent))
        })
    }

    /// A non-terminal booking by `passenger` on `ride`
    #[must_use]
    pub fn active_booking(&self, ride: RideId, passenger: UserId) -> Option<&BookingEntry> {
        self.bookings.values().find(|entry| {
            entry.booking.ride.id == ride
                && entry.booking.passenger.id == passenger
                && !entry.booking.status.is_terminal()
        })
    }

    /// Driver of a ride, from ride snapshots or bookings on it
    #[must_use]
    pub fn driver_of(&self, ride: RideId) -> Option<UserId> {
        self.rides.get(&ride).map(|r| r.driver.id).or_else(|| {
            self.bookings
                .values()
                .find(|entry| entry.booking.ride.id == ride)
                .map(|entry| entry.booking.ride.driver.id)
        })
    }

    /// Whether `passenger` has a completed booking on `ride`
    #[must_use]
    pub fn has_completed_trip(&self, ride: RideId, passenger: UserId) -> bool {
        self.bookings.values().any(|entry| {
            entry.booking.ride.id == ride
                && entry.booking.passenger.id == passenger
                && entry.booking.status == BookingStatus::Completed
        })
    }
}
