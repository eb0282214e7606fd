//! Processor intents and the payment widget seam.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::types::BookingId;

/// A live processor intent for a booking
///
/// At most one is live per booking. It ends when the server confirms the
/// payment or the passenger abandons it.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Booking the intent settles
    pub booking_id: BookingId,
    /// Opaque processor token handed to the widget
    pub client_secret: String,
}

impl PaymentIntent {
    /// Create an intent
    #[must_use]
    pub fn new(booking_id: BookingId, client_secret: impl Into<String>) -> Self {
        Self {
            booking_id,
            client_secret: client_secret.into(),
        }
    }

    /// Processor intent ID embedded in the secret (`pi_xxx_secret_yyy` → `pi_xxx`)
    #[must_use]
    pub fn intent_id(&self) -> &str {
        self.client_secret
            .split_once("_secret_")
            .map_or(self.client_secret.as_str(), |(id, _)| id)
    }
}

impl fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("booking_id", &self.booking_id)
            .field("intent_id", &self.intent_id())
            .finish_non_exhaustive()
    }
}

/// What the payment widget reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetOutcome {
    /// The processor captured the payment
    Succeeded {
        /// Processor intent ID to confirm with the server
        payment_intent_id: String,
    },
    /// The processor declined or errored; the intent stays usable
    Failed {
        /// Processor message
        reason: String,
    },
    /// The passenger closed the widget
    Abandoned,
}

/// External card/bank collection UI
///
/// Receives the client secret of a live intent and reports how the passenger
/// finished. Never talks to the Triply backend.
pub trait PaymentWidget: Send + Sync {
    /// Collect payment for `intent`
    fn collect<'a>(
        &'a self,
        intent: &'a PaymentIntent,
    ) -> Pin<Box<dyn Future<Output = WidgetOutcome> + Send + 'a>>;
}
