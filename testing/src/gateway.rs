//! In-memory Triply backend.
//!
//! [`MockGateway`] keeps rides, bookings, intents, notifications and reviews
//! in memory and enforces the server-side rules the client relies on:
//! identity from the session, driver-only responses, seat accounting on
//! confirmation and idempotent payment confirmation. Failures and latency
//! can be injected per endpoint, and every call is counted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use triply_core::error::GatewayError;
use triply_core::gateway::{BookingGateway, GatewayFuture, GatewayResult};
use triply_core::lifecycle::{BookingStatus, Decision};
use triply_core::session::SessionStore;
use triply_core::types::{
    Booking, BookingId, BookingReceipt, BookingRequest, Identity, Money, Notification,
    NotificationId, PaymentMethod, PaymentRequest, PaymentResult, Review, ReviewId,
    ReviewRequest, Ride, RideId, RideSearch, RideStatus, Role, UserId, WalletUpdate,
};

use crate::fixtures::person;

/// Backend endpoints, for call counting and failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `POST /bookings/book`
    Book,
    /// `GET /bookings/my`
    MyBookings,
    /// `GET /bookings/driver-requests`
    DriverRequests,
    /// `PUT /bookings/{id}/respond`
    Respond,
    /// `POST /bookings/cancel/{id}`
    Cancel,
    /// `POST /bookings/{id}/pay`
    Settle,
    /// `POST /bookings/{id}/confirm-payment`
    ConfirmPayment,
    /// `POST /payments/process`
    ProcessPayment,
    /// `POST /payments/confirm-stripe`
    ConfirmStripe,
    /// `GET /rides/search`
    SearchRides,
    /// `POST /rides/{id}/complete`
    CompleteRide,
    /// `GET /notifications`
    Notifications,
    /// `PUT /notifications/{id}/read`
    MarkNotificationRead,
    /// `POST /reviews`
    AddReview,
    /// `GET /reviews/user/{id}`
    UserReviews,
}

#[derive(Debug, Default)]
struct Backend {
    rides: BTreeMap<RideId, Ride>,
    bookings: BTreeMap<BookingId, Booking>,
    confirmed_intents: HashMap<BookingId, String>,
    notifications: Vec<(UserId, Notification)>,
    reviews: Vec<(UserId, Review)>,
    intents_created: usize,
    next_booking: u64,
    next_notification: u64,
    next_review: u64,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, VecDeque<GatewayError>>,
    latency: Option<Duration>,
}

/// In-memory [`BookingGateway`]
///
/// Clones share the same backend. The caller is whoever is signed in to the
/// session passed at construction.
///
/// # Example
///
/// ```
/// use triply_core::session::SessionStore;
/// use triply_testing::{MockGateway, fixtures};
///
/// let session = SessionStore::signed_in(fixtures::passenger());
/// let gateway = MockGateway::new(session).with_ride(fixtures::ride(42, 3));
/// assert_eq!(gateway.ride(triply_core::types::RideId::new(42)).map(|r| r.available_seats), Some(3));
/// ```
#[derive(Clone, Debug)]
pub struct MockGateway {
    backend: Arc<Mutex<Backend>>,
    session: SessionStore,
}

impl MockGateway {
    /// Empty backend acting for `session`
    #[must_use]
    pub fn new(session: SessionStore) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Backend {
                next_booking: 1,
                next_notification: 1,
                next_review: 1,
                ..Backend::default()
            })),
            session,
        }
    }

    /// Handle to the same backend acting for another session
    ///
    /// Models a second client (e.g. the driver's app) talking to the same
    /// server.
    #[must_use]
    pub fn acting_as(&self, session: SessionStore) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            session,
        }
    }

    /// Add a ride (builder form)
    #[must_use]
    pub fn with_ride(self, ride: Ride) -> Self {
        self.add_ride(ride);
        self
    }

    /// Add or replace a ride
    pub fn add_ride(&self, ride: Ride) {
        self.lock().rides.insert(ride.id, ride);
    }

    /// Add or replace a booking as if another client created it
    pub fn add_booking(&self, booking: Booking) {
        let mut backend = self.lock();
        backend.next_booking = backend.next_booking.max(booking.id.get() + 1);
        backend.rides.entry(booking.ride.id).or_insert_with(|| booking.ride.clone());
        backend.bookings.insert(booking.id, booking);
    }

    /// Change a booking's status behind the client's back
    pub fn set_status(&self, id: BookingId, status: BookingStatus) {
        if let Some(booking) = self.lock().bookings.get_mut(&id) {
            booking.status = status;
        }
    }

    /// Queue a notification for `recipient`
    pub fn notify(&self, recipient: UserId, kind: &str, message: &str) -> NotificationId {
        self.lock().push_notification(recipient, kind, message)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Fail the next call to `endpoint` with `error`
    pub fn fail_next(&self, endpoint: Endpoint, error: GatewayError) {
        self.fail_times(endpoint, 1, error);
    }

    /// Fail the next `times` calls to `endpoint` with `error`
    pub fn fail_times(&self, endpoint: Endpoint, times: usize, error: GatewayError) {
        let mut backend = self.lock();
        let queue = backend.failures.entry(endpoint).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Number of calls that reached `endpoint`, including injected failures
    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Number of calls across all endpoints
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Processor intents created (each one a potential charge)
    #[must_use]
    pub fn intents_created(&self) -> usize {
        self.lock().intents_created
    }

    /// Server view of a booking
    #[must_use]
    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        let backend = self.lock();
        backend.bookings.get(&id).map(|b| backend.view(b))
    }

    /// Server view of a ride
    #[must_use]
    pub fn ride(&self, id: RideId) -> Option<Ride> {
        self.lock().rides.get(&id).cloned()
    }

    /// Intent the server recorded when confirming a booking
    #[must_use]
    pub fn confirmed_intent(&self, id: BookingId) -> Option<String> {
        self.lock().confirmed_intents.get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn call<T, F>(&self, endpoint: Endpoint, operation: F) -> GatewayFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Backend, Option<&Identity>) -> GatewayResult<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.backend);
        let session = self.session.clone();

        Box::pin(async move {
            let latency = {
                let mut backend = shared.lock().unwrap_or_else(PoisonError::into_inner);
                *backend.calls.entry(endpoint).or_default() += 1;
                backend.latency
            };
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            let mut backend = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(error) = backend.failures.get_mut(&endpoint).and_then(VecDeque::pop_front) {
                tracing::debug!(?endpoint, error = %error, "Injected failure");
                return Err(error);
            }
            let caller = session.current_user();
            operation(&mut backend, caller.as_ref())
        })
    }
}

impl BookingGateway for MockGateway {
    fn book(&self, request: BookingRequest) -> GatewayFuture<BookingReceipt> {
        self.call(Endpoint::Book, move |backend, caller| backend.book(caller, &request))
    }

    fn my_bookings(&self) -> GatewayFuture<Vec<Booking>> {
        self.call(Endpoint::MyBookings, |backend, caller| {
            let caller = signed_in(caller)?;
            Ok(backend.bookings_where(|b| b.passenger.id == caller.id))
        })
    }

    fn driver_requests(&self) -> GatewayFuture<Vec<Booking>> {
        self.call(Endpoint::DriverRequests, |backend, caller| {
            let caller = signed_in(caller)?;
            Ok(backend.bookings_where(|b| b.ride.is_driven_by(caller.id)))
        })
    }

    fn respond(&self, id: BookingId, decision: Decision) -> GatewayFuture<Booking> {
        self.call(Endpoint::Respond, move |backend, caller| backend.respond(caller, id, decision))
    }

    fn cancel(&self, id: BookingId) -> GatewayFuture<Booking> {
        self.call(Endpoint::Cancel, move |backend, caller| backend.cancel(caller, id))
    }

    fn settle(&self, id: BookingId, method: PaymentMethod) -> GatewayFuture<Booking> {
        self.call(Endpoint::Settle, move |backend, caller| backend.settle(caller, id, method))
    }

    fn confirm_payment(&self, id: BookingId, payment_intent_id: String) -> GatewayFuture<Booking> {
        self.call(Endpoint::ConfirmPayment, move |backend, caller| {
            backend.confirm_payment(caller, id, payment_intent_id)
        })
    }

    fn process_payment(&self, request: PaymentRequest) -> GatewayFuture<PaymentResult> {
        self.call(Endpoint::ProcessPayment, move |backend, caller| {
            backend.process_payment(caller, &request)
        })
    }

    fn confirm_stripe(&self, payment_intent_id: String) -> GatewayFuture<WalletUpdate> {
        self.call(Endpoint::ConfirmStripe, move |_, caller| {
            signed_in(caller)?;
            Ok(WalletUpdate {
                message: format!("Wallet updated for {payment_intent_id}"),
            })
        })
    }

    fn search_rides(&self, search: RideSearch) -> GatewayFuture<Vec<Ride>> {
        self.call(Endpoint::SearchRides, move |backend, _| Ok(backend.search(&search)))
    }

    fn complete_ride(&self, id: RideId) -> GatewayFuture<Ride> {
        self.call(Endpoint::CompleteRide, move |backend, caller| backend.complete_ride(caller, id))
    }

    fn notifications(&self) -> GatewayFuture<Vec<Notification>> {
        self.call(Endpoint::Notifications, |backend, caller| {
            let caller = signed_in(caller)?;
            Ok(backend
                .notifications
                .iter()
                .filter(|(recipient, _)| *recipient == caller.id)
                .map(|(_, n)| n.clone())
                .collect())
        })
    }

    fn mark_notification_read(&self, id: NotificationId) -> GatewayFuture<Notification> {
        self.call(Endpoint::MarkNotificationRead, move |backend, caller| {
            let caller = signed_in(caller)?;
            let (_, notification) = backend
                .notifications
                .iter_mut()
                .find(|(recipient, n)| *recipient == caller.id && n.id == id)
                .ok_or_else(|| GatewayError::NotFound(format!("Notification {id}")))?;
            notification.read = true;
            Ok(notification.clone())
        })
    }

    fn add_review(&self, request: ReviewRequest) -> GatewayFuture<Review> {
        self.call(Endpoint::AddReview, move |backend, caller| backend.add_review(caller, request))
    }

    fn user_reviews(&self, user: UserId) -> GatewayFuture<Vec<Review>> {
        self.call(Endpoint::UserReviews, move |backend, _| {
            Ok(backend
                .reviews
                .iter()
                .filter(|(reviewee, _)| *reviewee == user)
                .map(|(_, review)| review.clone())
                .collect())
        })
    }
}

fn signed_in(caller: Option<&Identity>) -> GatewayResult<&Identity> {
    caller.ok_or(GatewayError::Unauthorized)
}

impl Backend {
    /// Booking with its ride refreshed from the ride table
    fn view(&self, booking: &Booking) -> Booking {
        let mut booking = booking.clone();
        if let Some(ride) = self.rides.get(&booking.ride.id) {
            booking.ride = ride.clone();
        }
        booking
    }

    fn bookings_where(&self, filter: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        self.bookings
            .values()
            .filter(|b| filter(b))
            .map(|b| self.view(b))
            .collect()
    }

    fn push_notification(&mut self, recipient: UserId, kind: &str, message: &str) -> NotificationId {
        let id = NotificationId::new(self.next_notification);
        self.next_notification += 1;
        self.notifications.push((
            recipient,
            Notification {
                id,
                kind: kind.to_string(),
                message: message.to_string(),
                read: false,
                created_at: None,
            },
        ));
        id
    }

    fn new_intent(&mut self) -> (String, String) {
        self.intents_created += 1;
        let id = format!("pi_mock_{}", self.intents_created);
        let secret = format!("{id}_secret_{}", self.intents_created);
        (id, secret)
    }

    fn booking_mut(&mut self, id: BookingId) -> GatewayResult<&mut Booking> {
        self.bookings
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("Booking {id}")))
    }

    /// Move a booking into CONFIRMED, taking its seats
    fn confirm(&mut self, id: BookingId) -> GatewayResult<Booking> {
        let booking = self.booking_mut(id)?;
        let (ride_id, seats, passenger) = (booking.ride.id, booking.seats_booked, booking.passenger.id);
        let ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| GatewayError::NotFound(format!("Ride {ride_id}")))?;
        if seats > ride.available_seats {
            return Err(GatewayError::Conflict("Not enough seats available".to_string()));
        }
        ride.available_seats -= seats;
        self.booking_mut(id)?.status = BookingStatus::Confirmed;
        self.push_notification(passenger, "BOOKING_CONFIRMED", &format!("Booking {id} is confirmed"));
        self.current(id)
    }

    fn current(&self, id: BookingId) -> GatewayResult<Booking> {
        self.bookings
            .get(&id)
            .map(|b| self.view(b))
            .ok_or_else(|| GatewayError::NotFound(format!("Booking {id}")))
    }

    fn book(&mut self, caller: Option<&Identity>, request: &BookingRequest) -> GatewayResult<BookingReceipt> {
        let caller = signed_in(caller)?;
        let ride = self
            .rides
            .get(&request.ride_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("Ride {}", request.ride_id)))?;
        if ride.is_driven_by(caller.id) {
            return Err(GatewayError::BadRequest("You cannot book your own ride".to_string()));
        }
        if ride.status != RideStatus::Posted {
            return Err(GatewayError::BadRequest("Ride is not open for booking".to_string()));
        }
        if request.seats_booked > ride.available_seats {
            return Err(GatewayError::Conflict("Not enough seats available".to_string()));
        }

        let id = BookingId::new(self.next_booking);
        self.next_booking += 1;
        let booking = Booking {
            id,
            status: BookingStatus::Pending,
            seats_booked: request.seats_booked,
            payment_method: request.payment_method,
            fare_amount: Some(Money::from_cents(
                ride.fare_per_seat.cents() * u64::from(request.seats_booked),
            )),
            passenger: person(caller),
            ride,
        };
        self.push_notification(
            booking.ride.driver.id,
            "NEW_BOOKING",
            &format!("{} requested {} seat(s)", caller.name, request.seats_booked),
        );
        self.bookings.insert(id, booking.clone());

        if request.payment_method.requires_intent() {
            let (_, client_secret) = self.new_intent();
            Ok(BookingReceipt::WithIntent {
                booking,
                client_secret,
            })
        } else {
            Ok(BookingReceipt::Plain(booking))
        }
    }

    fn respond(&mut self, caller: Option<&Identity>, id: BookingId, decision: Decision) -> GatewayResult<Booking> {
        let caller = signed_in(caller)?;
        let booking = self.booking_mut(id)?;
        if !booking.ride.is_driven_by(caller.id) {
            return Err(GatewayError::Forbidden("Only the ride's driver can respond".to_string()));
        }
        if booking.status != BookingStatus::Pending {
            return Err(GatewayError::BadRequest(format!("Booking is already {}", booking.status)));
        }
        booking.status = decision.transition().target();
        let passenger = booking.passenger.id;
        self.push_notification(
            passenger,
            &format!("BOOKING_{}", decision.as_str()),
            &format!("Your booking {id} was {}", decision.as_str().to_lowercase()),
        );
        self.current(id)
    }

    fn cancel(&mut self, caller: Option<&Identity>, id: BookingId) -> GatewayResult<Booking> {
        let caller = signed_in(caller)?;
        let booking = self.booking_mut(id)?;
        if !booking.involves(caller.id) && caller.role != Role::Admin {
            return Err(GatewayError::Forbidden("Not your booking".to_string()));
        }
        if booking.status.is_terminal() {
            return Err(GatewayError::BadRequest(format!("Booking is already {}", booking.status)));
        }
        let restore = (booking.status == BookingStatus::Confirmed).then_some(booking.seats_booked);
        booking.status = BookingStatus::Cancelled;
        let ride_id = booking.ride.id;
        if let (Some(seats), Some(ride)) = (restore, self.rides.get_mut(&ride_id)) {
            ride.available_seats += seats;
        }
        self.current(id)
    }

    fn settle(&mut self, caller: Option<&Identity>, id: BookingId, method: PaymentMethod) -> GatewayResult<Booking> {
        let caller = signed_in(caller)?;
        let booking = self.booking_mut(id)?;
        if !booking.involves(caller.id) {
            return Err(GatewayError::Forbidden("Not your booking".to_string()));
        }
        if method != booking.payment_method {
            return Err(GatewayError::BadRequest(format!(
                "Booking is paid by {}",
                booking.payment_method
            )));
        }
        if booking.status != BookingStatus::Approved {
            return Err(GatewayError::BadRequest(format!("Booking is {}", booking.status)));
        }
        self.confirm(id)
    }

    fn confirm_payment(
        &mut self,
        caller: Option<&Identity>,
        id: BookingId,
        payment_intent_id: String,
    ) -> GatewayResult<Booking> {
        let caller = signed_in(caller)?;
        let booking = self.booking_mut(id)?;
        if booking.passenger.id != caller.id {
            return Err(GatewayError::Forbidden("Not your booking".to_string()));
        }
        let status = booking.status;
        let method = booking.payment_method;

        if matches!(status, BookingStatus::Confirmed | BookingStatus::Completed) {
            return if self.confirmed_intents.get(&id) == Some(&payment_intent_id) {
                self.current(id)
            } else {
                Err(GatewayError::BadRequest(format!("Booking is already {status}")))
            };
        }
        if !method.requires_intent() || !matches!(status, BookingStatus::Pending | BookingStatus::Approved) {
            return Err(GatewayError::BadRequest(format!("Booking is {status}")));
        }
        let booking = self.confirm(id)?;
        self.confirmed_intents.insert(id, payment_intent_id);
        Ok(booking)
    }

    fn process_payment(&mut self, caller: Option<&Identity>, request: &PaymentRequest) -> GatewayResult<PaymentResult> {
        let caller = signed_in(caller)?;
        let booking = self.booking_mut(request.booking_id)?;
        if booking.passenger.id != caller.id {
            return Err(GatewayError::Forbidden("Not your booking".to_string()));
        }
        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Approved) {
            return Err(GatewayError::BadRequest(format!("Booking is {}", booking.status)));
        }
        let (payment_intent_id, client_secret) = self.new_intent();
        Ok(PaymentResult {
            client_secret: Some(client_secret),
            payment_intent_id: Some(payment_intent_id),
            status: Some("PENDING".to_string()),
        })
    }

    fn search(&self, search: &RideSearch) -> Vec<Ride> {
        let contains = |field: &str, filter: &str| {
            filter.is_empty() || field.to_lowercase().contains(&filter.to_lowercase())
        };
        self.rides
            .values()
            .filter(|ride| ride.status == RideStatus::Posted)
            .filter(|ride| contains(&ride.source, &search.source))
            .filter(|ride| contains(&ride.destination, &search.destination))
            .filter(|ride| search.date.is_none_or(|date| ride.departure_time.date() == date))
            .filter(|ride| search.min_fare.is_none_or(|min| ride.fare_per_seat >= min))
            .filter(|ride| search.max_fare.is_none_or(|max| ride.fare_per_seat <= max))
            .cloned()
            .collect()
    }

    fn complete_ride(&mut self, caller: Option<&Identity>, id: RideId) -> GatewayResult<Ride> {
        let caller = signed_in(caller)?;
        let ride = self
            .rides
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("Ride {id}")))?;
        if !ride.is_driven_by(caller.id) {
            return Err(GatewayError::Forbidden("Only the ride's driver can complete it".to_string()));
        }
        if ride.status != RideStatus::Posted {
            return Err(GatewayError::BadRequest("Ride is already finished".to_string()));
        }
        ride.status = RideStatus::Completed;
        let ride = ride.clone();

        for booking in self.bookings.values_mut() {
            if booking.ride.id == id && booking.status == BookingStatus::Confirmed {
                booking.status = BookingStatus::Completed;
            }
        }
        Ok(ride)
    }

    fn add_review(&mut self, caller: Option<&Identity>, request: ReviewRequest) -> GatewayResult<Review> {
        signed_in(caller)?;
        if !(1..=5).contains(&request.rating) {
            return Err(GatewayError::BadRequest("Rating must be between 1 and 5".to_string()));
        }
        let review = Review {
            id: ReviewId::new(self.next_review),
            rating: request.rating,
            comment: request.comment,
            created_at: None,
        };
        self.next_review += 1;
        self.reviews.push((request.reviewee_id, review.clone()));
        Ok(review)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixtures;

    async fn book(gateway: &MockGateway, method: PaymentMethod) -> GatewayResult<BookingReceipt> {
        gateway
            .book(BookingRequest {
                ride_id: RideId::new(42),
                seats_booked: 2,
                payment_method: method,
                locations: None,
            })
            .await
    }

    #[tokio::test]
    async fn test_book_quotes_fare_and_issues_intent_for_cards() {
        let session = SessionStore::signed_in(fixtures::passenger());
        let gateway = MockGateway::new(session).with_ride(fixtures::ride(42, 3));

        let receipt = book(&gateway, PaymentMethod::Stripe).await.unwrap();

        let BookingReceipt::WithIntent { booking, client_secret } = receipt else {
            panic!("card bookings carry an intent");
        };
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.fare_amount, Some(Money::from_major(300)));
        assert!(client_secret.starts_with("pi_mock_1_secret_"));
        assert_eq!(gateway.intents_created(), 1);
        // Seats are only taken on confirmation
        assert_eq!(gateway.ride(RideId::new(42)).unwrap().available_seats, 3);
    }

    #[tokio::test]
    async fn test_confirmation_is_idempotent_per_intent() {
        let session = SessionStore::signed_in(fixtures::passenger());
        let gateway = MockGateway::new(session).with_ride(fixtures::ride(42, 3));
        let id = book(&gateway, PaymentMethod::Stripe).await.unwrap().booking().id;

        let first = gateway.confirm_payment(id, "pi_123".into()).await.unwrap();
        let again = gateway.confirm_payment(id, "pi_123".into()).await.unwrap();
        let other = gateway.confirm_payment(id, "pi_999".into()).await;

        assert_eq!(first, again);
        assert_eq!(first.status, BookingStatus::Confirmed);
        assert!(matches!(other, Err(GatewayError::BadRequest(_))));
        assert_eq!(gateway.ride(RideId::new(42)).unwrap().available_seats, 1);
        assert_eq!(gateway.confirmed_intent(id).as_deref(), Some("pi_123"));
    }

    #[tokio::test]
    async fn test_only_the_driver_responds() {
        let session = SessionStore::signed_in(fixtures::passenger());
        let gateway = MockGateway::new(session.clone()).with_ride(fixtures::ride(42, 3));
        let id = book(&gateway, PaymentMethod::Cash).await.unwrap().booking().id;

        let by_passenger = gateway.respond(id, Decision::Approved).await;
        assert!(matches!(by_passenger, Err(GatewayError::Forbidden(_))));

        session.sign_in(fixtures::driver());
        let approved = gateway.respond(id, Decision::Approved).await.unwrap();
        assert_eq!(approved.status, BookingStatus::Approved);

        let twice = gateway.respond(id, Decision::Rejected).await;
        assert!(matches!(twice, Err(GatewayError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_cancel_restores_confirmed_seats() {
        let session = SessionStore::signed_in(fixtures::driver());
        let gateway = MockGateway::new(session.clone()).with_ride(fixtures::ride(42, 3));
        session.sign_in(fixtures::passenger());
        let id = book(&gateway, PaymentMethod::Cash).await.unwrap().booking().id;
        gateway.set_status(id, BookingStatus::Approved);
        gateway.settle(id, PaymentMethod::Cash).await.unwrap();
        assert_eq!(gateway.ride(RideId::new(42)).unwrap().available_seats, 1);

        let cancelled = gateway.cancel(id).await.unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.ride.available_seats, 3);
        assert!(matches!(gateway.cancel(id).await, Err(GatewayError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let session = SessionStore::signed_in(fixtures::passenger());
        let gateway = MockGateway::new(session);
        gateway.fail_times(Endpoint::MyBookings, 2, GatewayError::Network("down".into()));

        assert!(gateway.my_bookings().await.is_err());
        assert!(gateway.my_bookings().await.is_err());
        assert!(gateway.my_bookings().await.unwrap().is_empty());
        assert_eq!(gateway.calls(Endpoint::MyBookings), 3);
    }

    #[tokio::test]
    async fn test_notifications_are_per_recipient() {
        let session = SessionStore::signed_in(fixtures::passenger());
        let gateway = MockGateway::new(session).with_ride(fixtures::ride(42, 3));
        book(&gateway, PaymentMethod::Cash).await.unwrap();
        let id = gateway.notify(fixtures::PASSENGER_ID, "PROMO", "Monsoon offer");

        let mine = gateway.notifications().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(!mine[0].read);

        let read = gateway.mark_notification_read(id).await.unwrap();
        assert!(read.read);
    }

    #[tokio::test]
    async fn test_requires_a_session() {
        let gateway = MockGateway::new(SessionStore::new()).with_ride(fixtures::ride(42, 3));

        let result = book(&gateway, PaymentMethod::Cash).await;

        assert_eq!(result, Err(GatewayError::Unauthorized));
    }
}
