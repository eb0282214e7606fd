//! Triply REST client implementation

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use triply_core::error::GatewayError;
use triply_core::gateway::{BookingGateway, GatewayFuture};
use triply_core::lifecycle::Decision;
use triply_core::session::SessionStore;
use triply_core::types::{
    Booking, BookingId, BookingReceipt, BookingRequest, Notification, NotificationId,
    PaymentMethod, PaymentRequest, PaymentResult, Review, ReviewRequest, Ride, RideId, RideSearch,
    UserId, WalletUpdate,
};

use crate::config::ClientConfig;

/// Triply API client
///
/// Attaches the session's bearer token to every request made while someone
/// is signed in.
#[derive(Clone, Debug)]
pub struct TriplyClient {
    client: Client,
    api_url: String,
    session: SessionStore,
}

impl TriplyClient {
    /// Create a client acting for `session`
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, session: SessionStore) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.base_url,
            session,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.api_url));
        match self.session.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send<T>(&self, request: RequestBuilder) -> GatewayFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;

            if !status.is_success() {
                let error = status_error(status, &String::from_utf8_lossy(&body));
                tracing::debug!(status = status.as_u16(), error = %error, "Request rejected");
                return Err(error);
            }
            serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
        })
    }
}

/// Map a non-2xx response to a gateway error
fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let message = error_message(body);
    match status {
        StatusCode::BAD_REQUEST if reports_no_seats(&message) => GatewayError::Conflict(message),
        StatusCode::BAD_REQUEST => GatewayError::BadRequest(message),
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
        StatusCode::FORBIDDEN => GatewayError::Forbidden(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::CONFLICT => GatewayError::Conflict(message),
        status => GatewayError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Error text from a plain-text or `{"message": ...}` body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn reports_no_seats(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("seat") && (message.contains("not enough") || message.contains("available"))
}

impl BookingGateway for TriplyClient {
    fn book(&self, request: BookingRequest) -> GatewayFuture<BookingReceipt> {
        self.send(self.request(Method::POST, "/bookings/book").json(&request))
    }

    fn my_bookings(&self) -> GatewayFuture<Vec<Booking>> {
        self.send(self.request(Method::GET, "/bookings/my"))
    }

    fn driver_requests(&self) -> GatewayFuture<Vec<Booking>> {
        self.send(self.request(Method::GET, "/bookings/driver-requests"))
    }

    fn respond(&self, booking_id: BookingId, decision: Decision) -> GatewayFuture<Booking> {
        self.send(
            self.request(Method::PUT, &format!("/bookings/{booking_id}/respond"))
                .query(&[("status", decision.as_str())]),
        )
    }

    fn cancel(&self, booking_id: BookingId) -> GatewayFuture<Booking> {
        self.send(self.request(Method::POST, &format!("/bookings/cancel/{booking_id}")))
    }

    fn settle(&self, booking_id: BookingId, method: PaymentMethod) -> GatewayFuture<Booking> {
        self.send(
            self.request(Method::POST, &format!("/bookings/{booking_id}/pay"))
                .json(&json!({ "paymentMethod": method })),
        )
    }

    fn confirm_payment(
        &self,
        booking_id: BookingId,
        payment_intent_id: String,
    ) -> GatewayFuture<Booking> {
        self.send(
            self.request(Method::POST, &format!("/bookings/{booking_id}/confirm-payment"))
                .query(&[("paymentIntentId", payment_intent_id)]),
        )
    }

    fn process_payment(&self, request: PaymentRequest) -> GatewayFuture<PaymentResult> {
        self.send(self.request(Method::POST, "/payments/process").json(&request))
    }

    fn confirm_stripe(&self, payment_intent_id: String) -> GatewayFuture<WalletUpdate> {
        self.send(
            self.request(Method::POST, "/payments/confirm-stripe")
                .json(&json!({ "paymentIntentId": payment_intent_id })),
        )
    }

    fn search_rides(&self, search: RideSearch) -> GatewayFuture<Vec<Ride>> {
        self.send(
            self.request(Method::GET, "/rides/search")
                .query(&search.query_pairs()),
        )
    }

    fn complete_ride(&self, ride_id: RideId) -> GatewayFuture<Ride> {
        self.send(self.request(Method::POST, &format!("/rides/{ride_id}/complete")))
    }

    fn notifications(&self) -> GatewayFuture<Vec<Notification>> {
        self.send(self.request(Method::GET, "/notifications"))
    }

    fn mark_notification_read(&self, id: NotificationId) -> GatewayFuture<Notification> {
        self.send(self.request(Method::PUT, &format!("/notifications/{id}/read")))
    }

    fn add_review(&self, request: ReviewRequest) -> GatewayFuture<Review> {
        self.send(self.request(Method::POST, "/reviews").json(&request))
    }

    fn user_reviews(&self, user_id: UserId) -> GatewayFuture<Vec<Review>> {
        self.send(self.request(Method::GET, &format!("/reviews/user/{user_id}")))
    }
}
