//! Awaitable booking operations on top of the store.
//!
//! Each operation sends one command to the booking reducer and waits for the
//! result action carrying the same correlation id. Mutations are serialized
//! per booking (and per ride for requests and completion), so a second call
//! waits for the first and is then validated against the state it left.

use std::sync::Arc;
use tokio::sync::broadcast;
use triply_core::booking::{
    BookingAction, BookingEnvironment, BookingFlow, BookingReducer, BookingState,
};
use triply_core::environment::{Clock, SystemClock};
use triply_core::error::BookingError;
use triply_core::gateway::BookingGateway;
use triply_core::lifecycle::Decision;
use triply_core::payment::{PaymentIntent, PaymentWidget, WidgetOutcome};
use triply_core::session::SessionStore;
use triply_core::types::{
    Booking, BookingId, BookingReceipt, CorrelationId, Locations, PaymentMethod, Review,
    ReviewRequest, Ride, RideId, RideSearch, UserId,
};

use crate::config::CoordinatorConfig;
use crate::error::StoreError;
use crate::locks::{KeyedLocks, LockKey};
use crate::metrics::BookingMetrics;
use crate::notifications::NotificationPoller;
use crate::retry::retry_with_predicate;
use crate::store::Store;

type BookingStore = Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>;

/// Result of a booking request
#[derive(Clone, Debug, PartialEq)]
pub enum BookingOutcome {
    /// Booking created; payment happens after approval
    Booked(Booking),
    /// Booking created with a live intent to pay now
    AwaitingPayment {
        /// Created booking
        booking: Booking,
        /// Intent to hand to the payment widget
        intent: PaymentIntent,
    },
}

impl BookingOutcome {
    /// The created booking
    #[must_use]
    pub const fn booking(&self) -> &Booking {
        match self {
            Self::Booked(booking) | Self::AwaitingPayment { booking, .. } => booking,
        }
    }
}

/// Result of running the payment widget
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentOutcome {
    /// The server confirmed the payment
    Confirmed(Booking),
    /// The passenger closed the widget; the intent was dropped
    Abandoned,
}

/// Booking lifecycle coordinator
///
/// Cheap to clone; clones share the same store, locks and session.
#[derive(Clone)]
pub struct BookingCoordinator {
    store: BookingStore,
    gateway: Arc<dyn BookingGateway>,
    session: SessionStore,
    locks: Arc<KeyedLocks<LockKey>>,
    config: CoordinatorConfig,
}

impl BookingCoordinator {
    /// Creates a coordinator using the system clock
    #[must_use]
    pub fn new(
        gateway: Arc<dyn BookingGateway>,
        session: SessionStore,
        config: CoordinatorConfig,
    ) -> Self {
        Self::with_clock(gateway, session, Arc::new(SystemClock), config)
    }

    /// Creates a coordinator with an injected clock
    #[must_use]
    pub fn with_clock(
        gateway: Arc<dyn BookingGateway>,
        session: SessionStore,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        let environment = BookingEnvironment::new(Arc::clone(&gateway), session.clone(), clock);
        Self {
            store: Store::new(BookingState::new(), BookingReducer::new(), environment),
            gateway,
            session,
            locks: Arc::new(KeyedLocks::new()),
            config,
        }
    }

    /// Session this coordinator acts for
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ========================================================================
    // Booking lifecycle
    // ========================================================================

    /// Ask for seats on a ride
    ///
    /// A second request for the same ride waits for the first, then fails
    /// validation against the booking it created.
    ///
    /// # Errors
    ///
    /// `Auth` without a session, `Validation` for the ride's own driver, zero
    /// seats or more seats than are available, `Conflict` when the server
    /// reports the seats gone, `Reconciliation` while a payment on this ride
    /// awaits confirmation.
    #[tracing::instrument(skip(self, ride, locations), fields(ride_id = %ride.id))]
    pub async fn request_booking(
        &self,
        ride: Ride,
        seats: u32,
        payment_method: PaymentMethod,
        locations: Option<Locations>,
    ) -> Result<BookingOutcome, BookingError> {
        let _guard = self.locks.acquire(LockKey::Ride(ride.id)).await;
        let route = RideSearch::between(ride.source.clone(), ride.destination.clone())
            .on(ride.departure_time.date());
        let result = match self
            .dispatch("request_booking", |correlation_id| BookingAction::RequestBooking {
                correlation_id,
                ride,
                seats,
                payment_method,
                locations,
            })
            .await
        {
            Ok(result) => result,
            Err(error) => {
                if error.requires_refresh() {
                    self.reload_rides(route).await;
                }
                return Err(error);
            },
        };

        match result {
            BookingAction::BookingRequested { receipt, .. } => Ok(match receipt {
                BookingReceipt::WithIntent {
                    booking,
                    client_secret,
                } => BookingOutcome::AwaitingPayment {
                    intent: PaymentIntent::new(booking.id, client_secret),
                    booking,
                },
                BookingReceipt::Plain(booking) => BookingOutcome::Booked(booking),
            }),
            other => Err(mismatch(&other)),
        }
    }

    /// Driver approves or rejects a pending request
    ///
    /// # Errors
    ///
    /// `Auth` unless the caller drives the ride, `State` unless the booking is
    /// pending, `Conflict` when another change won the race.
    #[tracing::instrument(skip(self))]
    pub async fn respond_to_request(
        &self,
        booking_id: BookingId,
        decision: Decision,
    ) -> Result<Booking, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        self.ensure_known(booking_id).await;
        let result = self
            .dispatch("respond_to_request", |correlation_id| BookingAction::RespondToRequest {
                correlation_id,
                booking_id,
                decision,
            })
            .await?;
        updated_booking(result)
    }

    /// Cancel a booking as its passenger or driver
    ///
    /// # Errors
    ///
    /// `State` for bookings already rejected, cancelled or completed;
    /// `Reconciliation` while a captured payment awaits confirmation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        self.ensure_known(booking_id).await;
        let result = self
            .dispatch("cancel", |correlation_id| BookingAction::CancelBooking {
                correlation_id,
                booking_id,
            })
            .await?;
        updated_booking(result)
    }

    /// Record a cash payment on an approved booking
    ///
    /// # Errors
    ///
    /// `Validation` for bookings paid through the processor, `State` unless
    /// the booking is approved.
    #[tracing::instrument(skip(self))]
    pub async fn settle_cash(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        self.ensure_known(booking_id).await;
        let result = self
            .dispatch("settle_cash", |correlation_id| BookingAction::SettleCash {
                correlation_id,
                booking_id,
            })
            .await?;
        updated_booking(result)
    }

    /// Driver finishes a ride; its confirmed bookings become completed
    ///
    /// # Errors
    ///
    /// `Auth` unless the caller drives the ride, `Validation` if it is
    /// already completed.
    #[tracing::instrument(skip(self))]
    pub async fn mark_completed(&self, ride_id: RideId) -> Result<Ride, BookingError> {
        let _guard = self.locks.acquire(LockKey::Ride(ride_id)).await;
        let result = self
            .dispatch("mark_completed", |correlation_id| BookingAction::MarkRideCompleted {
                correlation_id,
                ride_id,
            })
            .await?;

        match result {
            BookingAction::RideCompleted { ride, .. } => Ok(ride),
            other => Err(mismatch(&other)),
        }
    }

    /// Review the other party of a completed trip
    ///
    /// # Errors
    ///
    /// `Validation` for ratings outside 1..=5, self reviews, or trips that
    /// are not completed.
    #[tracing::instrument(skip(self, comment))]
    pub async fn submit_review(
        &self,
        ride_id: RideId,
        reviewee_id: UserId,
        rating: u8,
        comment: impl Into<String>,
    ) -> Result<Review, BookingError> {
        let review = ReviewRequest {
            ride_id,
            reviewee_id,
            rating,
            comment: comment.into(),
        };
        let result = self
            .dispatch("submit_review", |correlation_id| BookingAction::SubmitReview {
                correlation_id,
                review,
            })
            .await?;

        match result {
            BookingAction::ReviewSubmitted { review, .. } => Ok(review),
            other => Err(mismatch(&other)),
        }
    }

    // ========================================================================
    // Payments
    // ========================================================================

    /// Obtain the live processor intent for a booking, creating one if needed
    ///
    /// # Errors
    ///
    /// `Validation` for cash bookings, `State` unless the booking awaits
    /// payment, `Reconciliation` while an earlier payment awaits confirmation.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(&self, booking_id: BookingId) -> Result<PaymentIntent, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        self.ensure_known(booking_id).await;
        let result = self
            .dispatch("initiate_payment", |correlation_id| BookingAction::InitiatePayment {
                correlation_id,
                booking_id,
            })
            .await?;

        match result {
            BookingAction::PaymentInitiated { intent, .. } => Ok(intent),
            other => Err(mismatch(&other)),
        }
    }

    /// Collect a payment through `widget` and confirm it with the server
    ///
    /// A failed attempt keeps the intent live for another try.
    ///
    /// # Errors
    ///
    /// `Payment` when the widget reports a failure, `Reconciliation` when the
    /// charge went through but confirmation could not reach the server, plus
    /// the errors of [`Self::initiate_payment`].
    #[tracing::instrument(skip(self, widget))]
    pub async fn pay_with_widget(
        &self,
        booking_id: BookingId,
        widget: &dyn PaymentWidget,
    ) -> Result<PaymentOutcome, BookingError> {
        let intent = self.initiate_payment(booking_id).await?;

        match widget.collect(&intent).await {
            WidgetOutcome::Succeeded { payment_intent_id } => {
                tracing::info!(%booking_id, payment_intent_id = %payment_intent_id, "Payment collected");
                self.confirm_payment(booking_id, payment_intent_id)
                    .await
                    .map(PaymentOutcome::Confirmed)
            },
            WidgetOutcome::Failed { reason } => {
                tracing::warn!(%booking_id, reason = %reason, "Payment widget reported a failure");
                BookingMetrics::record_failure("pay_with_widget", "payment");
                Err(BookingError::Payment(reason))
            },
            WidgetOutcome::Abandoned => {
                tracing::info!(%booking_id, "Payment widget closed");
                self.store
                    .send(BookingAction::AbandonPayment { booking_id })
                    .await
                    .map_err(store_error)?;
                Ok(PaymentOutcome::Abandoned)
            },
        }
    }

    /// Ask the server to confirm a payment the processor reported as succeeded
    ///
    /// Idempotent for an intent the server already confirmed. Transient
    /// failures are retried with backoff; only the confirmation is repeated.
    ///
    /// # Errors
    ///
    /// `Reconciliation` once retries are exhausted; the booking then stays in
    /// the reconciliation gap until [`Self::retry_confirmation`] succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        booking_id: BookingId,
        payment_intent_id: String,
    ) -> Result<Booking, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        self.ensure_known(booking_id).await;
        self.confirm_with_retry(booking_id, payment_intent_id).await
    }

    /// Re-issue the confirmation for a booking in the reconciliation gap
    ///
    /// # Errors
    ///
    /// `Validation` if no payment awaits confirmation, otherwise as
    /// [`Self::confirm_payment`].
    #[tracing::instrument(skip(self))]
    pub async fn retry_confirmation(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let _guard = self.locks.acquire(LockKey::Booking(booking_id)).await;
        let pending = self
            .store
            .state(|s| {
                s.flow(booking_id)
                    .and_then(BookingFlow::unreconciled_intent)
                    .map(str::to_string)
            })
            .await;

        let Some(payment_intent_id) = pending else {
            return Err(BookingError::Validation(format!(
                "Booking {booking_id} has no payment awaiting confirmation"
            )));
        };
        self.confirm_with_retry(booking_id, payment_intent_id).await
    }

    async fn confirm_with_retry(
        &self,
        booking_id: BookingId,
        payment_intent_id: String,
    ) -> Result<Booking, BookingError> {
        let attempt = || {
            let payment_intent_id = payment_intent_id.clone();
            async move {
                match self
                    .settle("confirm_payment", |correlation_id| BookingAction::ConfirmPayment {
                        correlation_id,
                        booking_id,
                        payment_intent_id,
                    })
                    .await
                {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(error)) => Err(Unconfirmed::Failed(error)),
                    Err(error) => Err(Unconfirmed::Unanswered(error)),
                }
            }
        };

        // Only a call that failed is repeated; one still in flight is never doubled
        let outcome = retry_with_predicate(self.config.confirm_policy(), attempt, |failure| {
            matches!(failure, Unconfirmed::Failed(BookingError::Network(_)))
        })
        .await;

        match outcome {
            Ok(result) => {
                let booking = updated_booking(result)?;
                BookingMetrics::record_payment_confirmed();
                Ok(booking)
            },
            Err(Unconfirmed::Failed(error)) if error.leaves_outcome_unknown() => {
                self.open_reconciliation(booking_id, payment_intent_id, &error.to_string())
                    .await
            },
            Err(Unconfirmed::Unanswered(StoreError::Timeout)) => {
                self.open_reconciliation(booking_id, payment_intent_id, "no answer in time")
                    .await
            },
            Err(Unconfirmed::Failed(error)) => Err(error),
            Err(Unconfirmed::Unanswered(error)) => Err(store_error(error)),
        }
    }

    /// Put a charged but unconfirmed payment into the reconciliation gap
    async fn open_reconciliation(
        &self,
        booking_id: BookingId,
        payment_intent_id: String,
        reason: &str,
    ) -> Result<Booking, BookingError> {
        tracing::error!(
            %booking_id,
            payment_intent_id = %payment_intent_id,
            reason,
            "Payment confirmation unresolved"
        );
        BookingMetrics::record_reconciliation_opened();
        self.store
            .send(BookingAction::OpenReconciliation {
                booking_id,
                payment_intent_id: payment_intent_id.clone(),
            })
            .await
            .map_err(store_error)?;
        Err(BookingError::Reconciliation {
            booking_id,
            payment_intent_id,
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Reload the caller's bookings (and, for drivers, incoming requests)
    ///
    /// # Errors
    ///
    /// `Auth` without a session, `Network` when the server is unreachable.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<Vec<Booking>, BookingError> {
        let result = self
            .dispatch("refresh_all", |correlation_id| BookingAction::RefreshBookings {
                correlation_id,
            })
            .await?;

        match result {
            BookingAction::BookingsRefreshed { bookings, .. } => Ok(bookings),
            other => Err(mismatch(&other)),
        }
    }

    /// Search rides; results also seed the local ride snapshots
    ///
    /// # Errors
    ///
    /// `Network` or `Validation` from the server.
    #[tracing::instrument(skip(self, search))]
    pub async fn search_rides(&self, search: RideSearch) -> Result<Vec<Ride>, BookingError> {
        let result = self
            .dispatch("search_rides", |correlation_id| BookingAction::SearchRides {
                correlation_id,
                search,
            })
            .await?;

        match result {
            BookingAction::RidesLoaded { rides, .. } => Ok(rides),
            other => Err(mismatch(&other)),
        }
    }

    /// Reviews received by a user
    ///
    /// # Errors
    ///
    /// Gateway errors converted to [`BookingError`].
    pub async fn user_reviews(&self, user_id: UserId) -> Result<Vec<Review>, BookingError> {
        self.gateway.user_reviews(user_id).await.map_err(BookingError::from)
    }

    /// Start polling notifications for the current session
    #[must_use]
    pub fn start_notifications(&self) -> NotificationPoller {
        NotificationPoller::spawn(
            Arc::clone(&self.gateway),
            &self.session,
            self.config.notification_interval(),
        )
    }

    /// All known bookings, ordered by ID
    pub async fn bookings(&self) -> Vec<Booking> {
        self.store
            .state(|s| s.bookings.values().map(|entry| entry.booking.clone()).collect())
            .await
    }

    /// Booking snapshot by ID
    pub async fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        self.store.state(|s| s.booking(booking_id).cloned()).await
    }

    /// Client-side flow of a booking
    pub async fn flow(&self, booking_id: BookingId) -> Option<BookingFlow> {
        self.store.state(|s| s.flow(booking_id).cloned()).await
    }

    /// Last failure recorded against a booking
    pub async fn last_error(&self, booking_id: BookingId) -> Option<BookingError> {
        self.store
            .state(|s| s.bookings.get(&booking_id).and_then(|entry| entry.last_error.clone()))
            .await
    }

    /// Known ride snapshots with local seat accounting
    pub async fn rides(&self) -> Vec<Ride> {
        self.store.state(|s| s.rides.values().cloned().collect()).await
    }

    /// Ride snapshot by ID
    pub async fn ride(&self, ride_id: RideId) -> Option<Ride> {
        self.store.state(|s| s.ride(ride_id).cloned()).await
    }

    /// Whether a mutating call on the booking is in flight
    pub async fn is_busy(&self, booking_id: BookingId) -> bool {
        self.store.state(|s| s.is_busy(booking_id)).await
    }

    /// Every result action after it has been applied
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookingAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting operations; results still in flight are discarded
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownTimeout`] if calls are still running when the
    /// configured timeout expires.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.store.shutdown(self.config.shutdown_timeout()).await
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    async fn dispatch<F>(&self, operation: &'static str, command: F) -> Result<BookingAction, BookingError>
    where
        F: FnOnce(CorrelationId) -> BookingAction,
    {
        self.settle(operation, command).await.map_err(store_error)?
    }

    /// Send a command and wait for the action that settles it
    ///
    /// The outer error means no settling action was seen; the command may
    /// still be running.
    async fn settle<F>(
        &self,
        operation: &'static str,
        command: F,
    ) -> Result<Result<BookingAction, BookingError>, StoreError>
    where
        F: FnOnce(CorrelationId) -> BookingAction,
    {
        BookingMetrics::record_command(operation);
        let correlation_id = CorrelationId::new();

        let result = self
            .store
            .send_and_wait_for(
                command(correlation_id),
                move |action| action.settles(correlation_id),
                self.config.action_timeout(),
            )
            .await?;

        match result {
            BookingAction::CommandFailed { error, .. } => {
                tracing::debug!(operation, %correlation_id, error = %error, "Operation failed");
                BookingMetrics::record_failure(operation, error_kind(&error));
                if error.requires_refresh() {
                    self.silent_refresh().await;
                }
                Ok(Err(error))
            },
            other => Ok(Ok(other)),
        }
    }

    /// Reload ride snapshots for a route, ignoring failures
    async fn reload_rides(&self, route: RideSearch) {
        let correlation_id = CorrelationId::new();
        let result = self
            .store
            .send_and_wait_for(
                BookingAction::SearchRides {
                    correlation_id,
                    search: route,
                },
                move |action| action.settles(correlation_id),
                self.config.action_timeout(),
            )
            .await;

        if let Err(error) = result {
            tracing::debug!(error = %error, "Ride reload failed");
        }
    }

    /// Reload authoritative state, ignoring failures
    async fn silent_refresh(&self) {
        let correlation_id = CorrelationId::new();
        let result = self
            .store
            .send_and_wait_for(
                BookingAction::RefreshBookings { correlation_id },
                move |action| action.settles(correlation_id),
                self.config.action_timeout(),
            )
            .await;

        match result {
            Ok(BookingAction::CommandFailed { error, .. }) => {
                tracing::debug!(error = %error, "Silent refresh failed");
            },
            Err(error) => tracing::debug!(error = %error, "Silent refresh failed"),
            Ok(_) => {},
        }
    }

    /// Load bookings from the server if `booking_id` is not known locally
    async fn ensure_known(&self, booking_id: BookingId) {
        if self.store.state(|s| s.booking(booking_id).is_none()).await {
            tracing::debug!(%booking_id, "Booking not loaded, refreshing");
            self.silent_refresh().await;
        }
    }
}

impl std::fmt::Debug for BookingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingCoordinator")
            .field("store", &self.store)
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Why a confirmation attempt produced no booking
#[derive(Debug)]
enum Unconfirmed {
    /// The command settled with an error
    Failed(BookingError),
    /// No settling action arrived; the call may still land
    Unanswered(StoreError),
}

impl std::fmt::Display for Unconfirmed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "{error}"),
            Self::Unanswered(error) => write!(f, "{error}"),
        }
    }
}

fn updated_booking(result: BookingAction) -> Result<Booking, BookingError> {
    match result {
        BookingAction::BookingUpdated { booking, .. } => Ok(booking),
        other => Err(mismatch(&other)),
    }
}

fn mismatch(action: &BookingAction) -> BookingError {
    tracing::error!(?action, "Unexpected result action");
    BookingError::Unexpected(format!("unexpected result {action:?}"))
}

fn store_error(error: StoreError) -> BookingError {
    match error {
        StoreError::Timeout => BookingError::Network("Timed out waiting for the server".to_string()),
        StoreError::ShutdownInProgress | StoreError::ShutdownTimeout(_) => {
            BookingError::Unexpected("The booking coordinator has shut down".to_string())
        },
        StoreError::ChannelClosed => BookingError::Unexpected(error.to_string()),
    }
}

const fn error_kind(error: &BookingError) -> &'static str {
    match error {
        BookingError::Validation(_) => "validation",
        BookingError::Auth(_) => "auth",
        BookingError::State { .. } => "state",
        BookingError::Conflict(_) => "conflict",
        BookingError::Payment(_) => "payment",
        BookingError::Reconciliation { .. } => "reconciliation",
        BookingError::Network(_) => "network",
        BookingError::NotFound(_) => "not_found",
        BookingError::Unexpected(_) => "unexpected",
    }
}
