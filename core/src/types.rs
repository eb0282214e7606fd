//! Domain types for the Triply booking client.
//!
//! These mirror the JSON shapes served by the Triply REST backend. Identifiers
//! are server-assigned integers; money travels as a decimal on the wire and is
//! held in minor units locally.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::lifecycle::BookingStatus;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw server identifier
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw server identifier
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Server-assigned identifier of a booking
    BookingId
);
numeric_id!(
    /// Server-assigned identifier of a ride
    RideId
);
numeric_id!(
    /// Server-assigned identifier of a user
    UserId
);
numeric_id!(
    /// Server-assigned identifier of a notification
    NotificationId
);
numeric_id!(
    /// Server-assigned identifier of a review
    ReviewId
);

/// Correlates a command sent to the store with the action that settles it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new random `CorrelationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount of money in minor units (paise/cents)
///
/// The backend serializes amounts as decimals (`150.5`); this type converts at
/// the serde boundary so arithmetic stays exact locally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from minor units
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Create from whole major units
    #[must_use]
    pub const fn from_major(units: u64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Amount in minor units
    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }
}

impl From<f64> for Money {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to >= 0 and rounded
    fn from(value: f64) -> Self {
        if value.is_finite() && value > 0.0 {
            Self((value * 100.0).round() as u64)
        } else {
            Self::ZERO
        }
    }
}

impl From<Money> for f64 {
    #[allow(clippy::cast_precision_loss)] // fares are far below 2^52 minor units
    fn from(value: Money) -> Self {
        value.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// People
// ============================================================================

/// Role of an authenticated user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Books seats on rides
    #[serde(alias = "ROLE_PASSENGER")]
    Passenger,
    /// Posts rides and answers booking requests
    #[serde(alias = "ROLE_DRIVER")]
    Driver,
    /// Back-office user
    #[serde(alias = "ROLE_ADMIN")]
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passenger => write!(f, "PASSENGER"),
            Self::Driver => write!(f, "DRIVER"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// The authenticated user acting through this client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Role
    pub role: Role,
    /// Bearer token issued at login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Identity {
    /// Whether this identity is the given user
    #[must_use]
    pub fn is(&self, user: UserId) -> bool {
        self.id == user
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A user as embedded in rides and bookings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// User ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email, when the backend discloses it
    #[serde(default)]
    pub email: Option<String>,
    /// Phone, when the backend discloses it
    #[serde(default)]
    pub phone: Option<String>,
    /// Vehicle model (drivers only)
    #[serde(default)]
    pub vehicle_model: Option<String>,
}

// ============================================================================
// Rides
// ============================================================================

/// Driver-controlled ride lifecycle, independent of booking lifecycles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    /// Open for bookings
    #[default]
    Posted,
    /// Trip finished
    Completed,
    /// Withdrawn by the driver
    Cancelled,
}

/// A driver-posted trip offering
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    /// Ride ID
    pub id: RideId,
    /// Departure place
    pub source: String,
    /// Arrival place
    pub destination: String,
    /// Local departure time
    pub departure_time: NaiveDateTime,
    /// Seats still bookable
    pub available_seats: u32,
    /// Fare per seat
    pub fare_per_seat: Money,
    /// Owning driver
    pub driver: Person,
    /// Ride lifecycle status
    #[serde(default)]
    pub status: RideStatus,
    /// Source latitude
    #[serde(default)]
    pub source_lat: Option<f64>,
    /// Source longitude
    #[serde(default)]
    pub source_lng: Option<f64>,
    /// Destination latitude
    #[serde(default)]
    pub dest_lat: Option<f64>,
    /// Destination longitude
    #[serde(default)]
    pub dest_lng: Option<f64>,
}

impl Ride {
    /// Whether the given user drives this ride
    #[must_use]
    pub fn is_driven_by(&self, user: UserId) -> bool {
        self.driver.id == user
    }
}

/// Filters for ride search; empty filters are omitted from the query string
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RideSearch {
    /// Departure place
    pub source: String,
    /// Arrival place
    pub destination: String,
    /// Departure date
    pub date: Option<NaiveDate>,
    /// Lower fare bound
    pub min_fare: Option<Money>,
    /// Upper fare bound
    pub max_fare: Option<Money>,
    /// Vehicle model filter
    pub vehicle_model: Option<String>,
}

impl RideSearch {
    /// Search between two places
    #[must_use]
    pub fn between(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Restrict to a departure date
    #[must_use]
    pub const fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Query-string pairs, skipping empty values
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.source.is_empty() {
            pairs.push(("source", self.source.clone()));
        }
        if !self.destination.is_empty() {
            pairs.push(("destination", self.destination.clone()));
        }
        if let Some(date) = self.date {
            pairs.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        if let Some(min) = self.min_fare {
            pairs.push(("minFare", min.to_string()));
        }
        if let Some(max) = self.max_fare {
            pairs.push(("maxFare", max.to_string()));
        }
        if let Some(model) = self.vehicle_model.as_ref().filter(|m| !m.is_empty()) {
            pairs.push(("vehicleModel", model.clone()));
        }
        pairs
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// How the passenger pays for a booking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Paid to the driver, confirmed by a settlement call
    #[default]
    Cash,
    /// Card payment through a processor intent
    #[serde(alias = "STRIPE_CARD")]
    Stripe,
    /// Bank transfer through a processor intent
    Netbanking,
}

impl PaymentMethod {
    /// Whether payment goes through a processor intent (two-phase)
    #[must_use]
    pub const fn requires_intent(self) -> bool {
        matches!(self, Self::Stripe | Self::Netbanking)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cash => write!(f, "CASH"),
            Self::Stripe => write!(f, "STRIPE"),
            Self::Netbanking => write!(f, "NETBANKING"),
        }
    }
}

/// Pickup/dropoff coordinates supplied at booking time
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locations {
    /// Pickup latitude
    pub pickup_lat: f64,
    /// Pickup longitude
    pub pickup_lng: f64,
    /// Dropoff latitude
    pub dropoff_lat: f64,
    /// Dropoff longitude
    pub dropoff_lng: f64,
}

/// A passenger's claim on seats of a ride
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking ID
    pub id: BookingId,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Seats claimed
    pub seats_booked: u32,
    /// Payment method chosen at booking time
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Server-computed fare for all seats
    #[serde(default)]
    pub fare_amount: Option<Money>,
    /// The ride booked
    pub ride: Ride,
    /// The passenger
    pub passenger: Person,
}

impl Booking {
    /// Whether the given user takes part in this booking (passenger or driver)
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.passenger.id == user || self.ride.is_driven_by(user)
    }
}

/// Body of `POST /bookings/book`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Ride to book
    pub ride_id: RideId,
    /// Seats to claim
    pub seats_booked: u32,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Optional pickup/dropoff coordinates
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Locations>,
}

/// Response of `POST /bookings/book`
///
/// Intent-based payment methods come back with a client secret that must be
/// handed to a payment widget before the booking can progress.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BookingReceipt {
    /// Booking plus processor client secret
    #[serde(rename_all = "camelCase")]
    WithIntent {
        /// The created booking
        booking: Booking,
        /// Processor client secret
        client_secret: String,
    },
    /// Booking only
    Plain(Booking),
}

impl BookingReceipt {
    /// The created booking
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::WithIntent { booking, .. } | Self::Plain(booking) => booking,
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Body of `POST /payments/process`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Booking being paid
    pub booking_id: BookingId,
    /// Server-quoted amount
    pub amount: Money,
    /// Payment method
    pub payment_method: PaymentMethod,
}

/// Response of `POST /payments/process`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    /// Processor client secret, for intent-based methods
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Processor intent ID
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    /// Server payment status (`PENDING`, `PAID`, ...)
    #[serde(default)]
    pub status: Option<String>,
}

/// Response of `POST /payments/confirm-stripe`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WalletUpdate {
    /// Server acknowledgement text
    pub message: String,
}

// ============================================================================
// Notifications & reviews
// ============================================================================

/// A server-side notification for the signed-in user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Kind, e.g. `NEW_BOOKING`, `BOOKING_CANCELLED`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable text
    pub message: String,
    /// Read flag
    #[serde(default)]
    pub read: bool,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Body of `POST /reviews`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// Ride the review is about
    pub ride_id: RideId,
    /// User being reviewed
    pub reviewee_id: UserId,
    /// Rating, 1 to 5
    pub rating: u8,
    /// Free text
    pub comment: String,
}

/// A stored review
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review ID
    pub id: ReviewId,
    /// Rating, 1 to 5
    pub rating: u8,
    /// Free text
    #[serde(default)]
    pub comment: String,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}
