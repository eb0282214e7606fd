//! Contract for the Triply REST backend.
//!
//! The reducer only ever talks to the backend through this trait.
//! `triply-client` implements it over HTTP and `triply-testing` provides an
//! in-memory backend. Implementations attach the session's bearer token
//! themselves.

use std::future::Future;
use std::pin::Pin;

use crate::error::GatewayError;
use crate::lifecycle::Decision;
use crate::types::{
    Booking, BookingId, BookingReceipt, BookingRequest, Notification, NotificationId,
    PaymentMethod, PaymentRequest, PaymentResult, Review, ReviewRequest, Ride, RideId, RideSearch,
    UserId, WalletUpdate,
};

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by gateway calls
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Backend operations used by the booking coordinator
pub trait BookingGateway: Send + Sync {
    /// `POST /bookings/book`
    fn book(&self, request: BookingRequest) -> GatewayFuture<BookingReceipt>;

    /// `GET /bookings/my`
    fn my_bookings(&self) -> GatewayFuture<Vec<Booking>>;

    /// `GET /bookings/driver-requests`
    fn driver_requests(&self) -> GatewayFuture<Vec<Booking>>;

    /// `PUT /bookings/{id}/respond?status=`
    fn respond(&self, booking_id: BookingId, decision: Decision) -> GatewayFuture<Booking>;

    /// `POST /bookings/cancel/{id}`
    fn cancel(&self, booking_id: BookingId) -> GatewayFuture<Booking>;

    /// `POST /bookings/{id}/pay`, direct settlement
    fn settle(&self, booking_id: BookingId, method: PaymentMethod) -> GatewayFuture<Booking>;

    /// `POST /bookings/{id}/confirm-payment?paymentIntentId=`
    fn confirm_payment(
        &self,
        booking_id: BookingId,
        payment_intent_id: String,
    ) -> GatewayFuture<Booking>;

    /// `POST /payments/process`
    fn process_payment(&self, request: PaymentRequest) -> GatewayFuture<PaymentResult>;

    /// `POST /payments/confirm-stripe`
    fn confirm_stripe(&self, payment_intent_id: String) -> GatewayFuture<WalletUpdate>;

    /// `GET /rides/search`
    fn search_rides(&self, search: RideSearch) -> GatewayFuture<Vec<Ride>>;

    /// `POST /rides/{id}/complete`
    ///
    /// Assumed contract: the backend otherwise completes rides on a timer
    /// after departure and exposes no endpoint for it. A server without this
    /// route answers 404, surfaced as `NotFound`.
    fn complete_ride(&self, ride_id: RideId) -> GatewayFuture<Ride>;

    /// `GET /notifications`
    fn notifications(&self) -> GatewayFuture<Vec<Notification>>;

    /// `PUT /notifications/{id}/read`
    fn mark_notification_read(&self, id: NotificationId) -> GatewayFuture<Notification>;

    /// `POST /reviews`
    fn add_review(&self, request: ReviewRequest) -> GatewayFuture<Review>;

    /// `GET /reviews/user/{id}`
    fn user_reviews(&self, user_id: UserId) -> GatewayFuture<Vec<Review>>;
}
