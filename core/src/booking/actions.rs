//! Commands and results of the booking reducer.

use crate::error::BookingError;
use crate::lifecycle::Decision;
use crate::payment::PaymentIntent;
use crate::types::{
    Booking, BookingId, BookingReceipt, CorrelationId, Locations, PaymentMethod, Review,
    ReviewRequest, Ride, RideId, RideSearch,
};

/// What a failed command was about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// A booking
    Booking(BookingId),
    /// A ride (booking requests, completion, reviews)
    Ride(RideId),
    /// Nothing specific (refresh, search)
    None,
}

/// Actions for the booking reducer
#[derive(Clone, Debug)]
pub enum BookingAction {
    // ========== Commands ==========
    /// Passenger asks for seats on a ride
    RequestBooking {
        /// Correlation
        correlation_id: CorrelationId,
        /// Ride as the passenger saw it
        ride: Ride,
        /// Seats wanted
        seats: u32,
        /// Payment method
        payment_method: PaymentMethod,
        /// Optional pickup/dropoff coordinates
        locations: Option<Locations>,
    },

    /// Driver approves or rejects a request
    RespondToRequest {
        /// Correlation
        correlation_id: CorrelationId,
        /// Booking
        booking_id: BookingId,
        /// Decision
        decision: Decision,
    },

    /// Passenger or driver cancels
    CancelBooking {
        /// Correlation
        correlation_id: CorrelationId,
        /// Booking
        booking_id: BookingId,
    },

    /// Cash changed hands; mark the booking paid
    SettleCash {
        /// Correlation
        correlation_id: CorrelationId,
        /// Booking
        booking_id: BookingId,
    },

    /// Obtain a processor intent (reusing the live one if any)
    InitiatePayment {
        /// Correlation
        correlation_id: CorrelationId,
        /// Booking
        booking_id: BookingId,
    },

    /// Ask the server to confirm a processor payment
    ConfirmPayment {
        /// Correlation
        correlation_id: CorrelationId,
        /// Booking
        booking_id: BookingId,
        /// Intent reported by the widget
        payment_intent_id: String,
    },

    /// Passenger closed the payment widget; drop the live intent
    AbandonPayment {
        /// Booking
        booking_id: BookingId,
    },

    /// Confirmation retries ran out after the processor charged the passenger
    OpenReconciliation {
        /// Booking
        booking_id: BookingId,
        /// Intent that was charged
        payment_intent_id: String,
    },

    /// Driver finishes a ride
    MarkRideCompleted {
        /// Correlation
        correlation_id: CorrelationId,
        /// Ride
        ride_id: RideId,
    },

    /// Review a trip participant
    SubmitReview {
        /// Correlation
        correlation_id: CorrelationId,
        /// Review
        review: ReviewRequest,
    },

    /// Reload bookings from the server
    RefreshBookings {
        /// Correlation
        correlation_id: CorrelationId,
    },

    /// Search rides
    SearchRides {
        /// Correlation
        correlation_id: CorrelationId,
        /// Filters
        search: RideSearch,
    },

    // ========== Results ==========
    /// Server created a booking
    BookingRequested {
        /// Correlation
        correlation_id: CorrelationId,
        /// Server response
        receipt: BookingReceipt,
    },

    /// Server returned a booking after a mutation
    BookingUpdated {
        /// Correlation
        correlation_id: CorrelationId,
        /// Server snapshot
        booking: Booking,
    },

    /// A processor intent is live
    PaymentInitiated {
        /// Correlation
        correlation_id: CorrelationId,
        /// Intent
        intent: PaymentIntent,
    },

    /// Server returned the caller's bookings
    BookingsRefreshed {
        /// Correlation
        correlation_id: CorrelationId,
        /// Server snapshots
        bookings: Vec<Booking>,
    },

    /// Server returned search results
    RidesLoaded {
        /// Correlation
        correlation_id: CorrelationId,
        /// Matching rides
        rides: Vec<Ride>,
    },

    /// Server completed a ride
    RideCompleted {
        /// Correlation
        correlation_id: CorrelationId,
        /// Server snapshot
        ride: Ride,
    },

    /// Server stored a review
    ReviewSubmitted {
        /// Correlation
        correlation_id: CorrelationId,
        /// Stored review
        review: Review,
    },

    /// A command was rejected locally or by the server
    CommandFailed {
        /// Correlation
        correlation_id: CorrelationId,
        /// What the command was about
        target: Target,
        /// Why
        error: BookingError,
    },
}

impl BookingAction {
    /// Correlation ID carried by the action, if any
    #[must_use]
    pub const fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::RequestBooking { correlation_id, .. }
            | Self::RespondToRequest { correlation_id, .. }
            | Self::CancelBooking { correlation_id, .. }
            | Self::SettleCash { correlation_id, .. }
            | Self::InitiatePayment { correlation_id, .. }
            | Self::ConfirmPayment { correlation_id, .. }
            | Self::MarkRideCompleted { correlation_id, .. }
            | Self::SubmitReview { correlation_id, .. }
            | Self::RefreshBookings { correlation_id }
            | Self::SearchRides { correlation_id, .. }
            | Self::BookingRequested { correlation_id, .. }
            | Self::BookingUpdated { correlation_id, .. }
            | Self::PaymentInitiated { correlation_id, .. }
            | Self::BookingsRefreshed { correlation_id, .. }
            | Self::RidesLoaded { correlation_id, .. }
            | Self::RideCompleted { correlation_id, .. }
            | Self::ReviewSubmitted { correlation_id, .. }
            | Self::CommandFailed { correlation_id, .. } => Some(*correlation_id),
            Self::AbandonPayment { .. } | Self::OpenReconciliation { .. } => None,
        }
    }

    /// Whether this is the result that settles command `id`
    #[must_use]
    pub fn settles(&self, id: CorrelationId) -> bool {
        self.is_result() && self.correlation_id() == Some(id)
    }

    /// Whether this action reports an outcome rather than requesting one
    #[must_use]
    pub const fn is_result(&self) -> bool {
        matches!(
            self,
            Self::BookingRequested { .. }
                | Self::BookingUpdated { .. }
                | Self::PaymentInitiated { .. }
                | Self::BookingsRefreshed { .. }
                | Self::RidesLoaded { .. }
                | Self::RideCompleted { .. }
                | Self::ReviewSubmitted { .. }
                | Self::CommandFailed { .. }
        )
    }
}
