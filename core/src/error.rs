//! Error taxonomy for booking operations

use thiserror::Error;

use crate::lifecycle::{BookingStatus, Transition};
use crate::types::BookingId;

/// Errors surfaced by booking operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Request rejected by local or server-side validation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No session, wrong role, or the server refused the credentials
    #[error("Not authorized: {0}")]
    Auth(String),

    /// The booking's current status does not allow the transition
    #[error("Booking {booking_id} is {status}; cannot {attempted} it")]
    State {
        /// Booking
        booking_id: BookingId,
        /// Status the booking was found in
        status: BookingStatus,
        /// Transition that was attempted
        attempted: Transition,
    },

    /// Server reported a concurrent modification (e.g. seats sold out)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment could not be completed
    #[error("Payment failed: {0}")]
    Payment(String),

    /// Payment succeeded at the processor but the server has not acknowledged it
    #[error(
        "Payment {payment_intent_id} for booking {booking_id} went through but is not yet confirmed"
    )]
    Reconciliation {
        /// Booking
        booking_id: BookingId,
        /// Processor intent that was charged
        payment_intent_id: String,
    },

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Booking, ride or review does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything else
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl BookingError {
    /// Whether the same call may succeed if repeated
    ///
    /// `Reconciliation` is retryable through the confirmation call only.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Reconciliation { .. })
    }

    /// Whether the failure says nothing about what the server did
    ///
    /// A confirmation failing this way may still have been recorded, so the
    /// payment must be reconciled rather than collected again.
    #[must_use]
    pub const fn leaves_outcome_unknown(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unexpected(_))
    }

    /// Whether local state may be stale and should be reloaded from the server
    #[must_use]
    pub const fn requires_refresh(&self) -> bool {
        matches!(self, Self::State { .. } | Self::Conflict(_))
    }

    /// Text suitable for showing to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => reason.clone(),
            Self::Auth(_) => "Please sign in again to continue.".to_string(),
            Self::State { status, attempted, .. } => {
                format!("This booking is {status} and can no longer be {}.", past_tense(*attempted))
            },
            Self::Conflict(_) => {
                "Someone else changed this booking or ride. We refreshed it, please try again."
                    .to_string()
            },
            Self::Payment(reason) => format!("Payment failed: {reason}"),
            Self::Reconciliation { .. } => {
                "Your payment went through but we could not confirm it yet. Tap retry to finish."
                    .to_string()
            },
            Self::Network(_) => {
                "We could not reach Triply. Check your connection and try again.".to_string()
            },
            Self::NotFound(_) => "That item no longer exists.".to_string(),
            Self::Unexpected(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

const fn past_tense(transition: Transition) -> &'static str {
    match transition {
        Transition::Approve => "approved",
        Transition::Reject => "rejected",
        Transition::Cancel => "cancelled",
        Transition::ConfirmPayment => "paid",
        Transition::Complete => "completed",
    }
}

/// Errors returned by a [`BookingGateway`](crate::gateway::BookingGateway)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// 400 Bad Request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 401 Unauthorized
    #[error("Unauthorized - session missing or expired")]
    Unauthorized,

    /// 403 Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404 Not Found
    #[error("Not found: {0}")]
    NotFound(String),

    /// 409 Conflict, or a 400 reporting seats sold out
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-2xx response
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Transport failure or timeout
    #[error("Request failed: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("Response parsing failed: {0}")]
    Decode(String),
}

impl From<GatewayError> for BookingError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::BadRequest(message) => Self::Validation(message),
            GatewayError::Unauthorized => Self::Auth("session missing or expired".to_string()),
            GatewayError::Forbidden(message) => Self::Auth(message),
            GatewayError::NotFound(message) => Self::NotFound(message),
            GatewayError::Conflict(message) => Self::Conflict(message),
            GatewayError::Api { status, message } if status >= 500 => {
                Self::Network(format!("server error {status}: {message}"))
            },
            GatewayError::Api { status, message } => {
                Self::Unexpected(format!("status {status}: {message}"))
            },
            GatewayError::Network(message) => Self::Network(message),
            GatewayError::Decode(message) => Self::Unexpected(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_status_mapping() {
        assert!(matches!(
            BookingError::from(GatewayError::Unauthorized),
            BookingError::Auth(_)
        ));
        assert!(matches!(
            BookingError::from(GatewayError::Conflict("sold out".into())),
            BookingError::Conflict(_)
        ));
        assert!(matches!(
            BookingError::from(GatewayError::Api { status: 503, message: "down".into() }),
            BookingError::Network(_)
        ));
        assert!(matches!(
            BookingError::from(GatewayError::Api { status: 418, message: "teapot".into() }),
            BookingError::Unexpected(_)
        ));
    }

    #[test]
    fn test_retry_and_refresh_classification() {
        let state = BookingError::State {
            booking_id: BookingId::new(1),
            status: BookingStatus::Cancelled,
            attempted: Transition::Cancel,
        };
        assert!(state.requires_refresh());
        assert!(!state.is_retryable());
        assert!(BookingError::Network("reset".into()).is_retryable());
        assert!(
            BookingError::Reconciliation {
                booking_id: BookingId::new(1),
                payment_intent_id: "pi_1".into(),
            }
            .is_retryable()
        );
        assert!(!BookingError::Payment("declined".into()).is_retryable());
    }

    #[test]
    fn test_unknown_outcome_classification() {
        assert!(BookingError::Network("reset".into()).leaves_outcome_unknown());
        assert!(BookingError::from(GatewayError::Decode("eof".into())).leaves_outcome_unknown());
        assert!(!BookingError::Validation("bad intent".into()).leaves_outcome_unknown());
        assert!(!BookingError::Conflict("sold out".into()).leaves_outcome_unknown());
    }

    #[test]
    fn test_state_error_message_names_status() {
        let error = BookingError::State {
            booking_id: BookingId::new(9),
            status: BookingStatus::Completed,
            attempted: Transition::Cancel,
        };
        assert_eq!(error.to_string(), "Booking 9 is COMPLETED; cannot cancel it");
        assert_eq!(
            error.user_message(),
            "This booking is COMPLETED and can no longer be cancelled."
        );
    }
}
