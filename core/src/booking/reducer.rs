//! Reducer for the booking lifecycle.
//!
//! Commands are validated here before any network call. A command that
//! fails validation is settled by a `CommandFailed` fed straight back through
//! the store; a valid one marks its booking `InFlight` and describes the
//! gateway call. Results only ever overwrite local state with server
//! snapshots.

use chrono::{DateTime, Utc};
use smallvec::{SmallVec, smallvec};
use std::collections::btree_map;
use std::sync::Arc;

use crate::booking::{
    BookingAction, BookingEntry, BookingEnvironment, BookingFlow, BookingState, Operation, Target,
};
use crate::effect::Effect;
use crate::error::BookingError;
use crate::gateway::{BookingGateway, GatewayFuture};
use crate::lifecycle::{BookingStatus, Decision, IllegalTransition, Transition};
use crate::payment::PaymentIntent;
use crate::reducer::Reducer;
use crate::types::{
    Booking, BookingId, BookingReceipt, BookingRequest, CorrelationId, Identity, Locations,
    PaymentMethod, PaymentRequest, ReviewRequest, Ride, RideId, RideSearch, RideStatus, Role,
};

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Booking lifecycle reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock().now();

        match action {
            // ========== Commands ==========
            BookingAction::RequestBooking {
                correlation_id,
                ride,
                seats,
                payment_method,
                locations,
            } => {
                let ride_id = ride.id;
                request_booking(state, env, correlation_id, ride, seats, payment_method, locations)
                    .unwrap_or_else(|error| reject(correlation_id, Target::Ride(ride_id), error))
            },

            BookingAction::RespondToRequest {
                correlation_id,
                booking_id,
                decision,
            } => respond(state, env, correlation_id, booking_id, decision, now)
                .unwrap_or_else(|error| reject(correlation_id, Target::Booking(booking_id), error)),

            BookingAction::CancelBooking {
                correlation_id,
                booking_id,
            } => cancel(state, env, correlation_id, booking_id, now)
                .unwrap_or_else(|error| reject(correlation_id, Target::Booking(booking_id), error)),

            BookingAction::SettleCash {
                correlation_id,
                booking_id,
            } => settle_cash(state, env, correlation_id, booking_id, now)
                .unwrap_or_else(|error| reject(correlation_id, Target::Booking(booking_id), error)),

            BookingAction::InitiatePayment {
                correlation_id,
                booking_id,
            } => initiate_payment(state, env, correlation_id, booking_id, now)
                .unwrap_or_else(|error| reject(correlation_id, Target::Booking(booking_id), error)),

            BookingAction::ConfirmPayment {
                correlation_id,
                booking_id,
                payment_intent_id,
            } => confirm_payment(state, env, correlation_id, booking_id, payment_intent_id, now)
                .unwrap_or_else(|error| reject(correlation_id, Target::Booking(booking_id), error)),

            BookingAction::AbandonPayment { booking_id } => {
                if let Some(entry) = state.bookings.get_mut(&booking_id) {
                    if matches!(entry.flow, BookingFlow::AwaitingPayment { .. }) {
                        tracing::info!(%booking_id, "Payment intent abandoned");
                        entry.flow = BookingFlow::Idle;
                        entry.updated_at = now;
                    }
                }
                smallvec![Effect::None]
            },

            BookingAction::OpenReconciliation {
                booking_id,
                payment_intent_id,
            } => {
                if let Some(entry) = state.bookings.get_mut(&booking_id) {
                    open_reconciliation(entry, payment_intent_id, now);
                }
                smallvec![Effect::None]
            },

            BookingAction::MarkRideCompleted {
                correlation_id,
                ride_id,
            } => mark_ride_completed(state, env, correlation_id, ride_id)
                .unwrap_or_else(|error| reject(correlation_id, Target::Ride(ride_id), error)),

            BookingAction::SubmitReview {
                correlation_id,
                review,
            } => {
                let ride_id = review.ride_id;
                submit_review(state, env, correlation_id, review)
                    .unwrap_or_else(|error| reject(correlation_id, Target::Ride(ride_id), error))
            },

            BookingAction::RefreshBookings { correlation_id } => {
                refresh(env, correlation_id)
                    .unwrap_or_else(|error| reject(correlation_id, Target::None, error))
            },

            BookingAction::SearchRides {
                correlation_id,
                search,
            } => search_rides(env, correlation_id, search),

            // ========== Results ==========
            BookingAction::BookingRequested { receipt, .. } => {
                let (booking, client_secret) = match receipt {
                    BookingReceipt::WithIntent {
                        booking,
                        client_secret,
                    } => (booking, Some(client_secret)),
                    BookingReceipt::Plain(booking) => (booking, None),
                };
                state.requests_in_flight.remove(&booking.ride.id);
                let booking_id = booking.id;
                tracing::info!(%booking_id, status = %booking.status, "Booking created");

                let entry = apply_snapshot(state, booking, now);
                if let Some(secret) = client_secret {
                    entry.flow = BookingFlow::AwaitingPayment {
                        intent: PaymentIntent::new(booking_id, secret),
                    };
                }
                smallvec![Effect::None]
            },

            BookingAction::BookingUpdated {
                correlation_id,
                booking,
            } => {
                let booking_id = booking.id;
                let status = booking.status;
                let gateway = env.gateway();
                let entry = apply_snapshot(state, booking, now);
                let finished = finish(entry, correlation_id);
                tracing::info!(%booking_id, %status, "Booking updated");

                match finished {
                    Some(Operation::ConfirmPayment { payment_intent_id })
                        if status == BookingStatus::Confirmed =>
                    {
                        entry.flow = BookingFlow::Paid {
                            payment_intent_id: payment_intent_id.clone(),
                        };
                        smallvec![release_wallet(gateway, payment_intent_id)]
                    },
                    Some(Operation::Cancel | Operation::SettleCash) => {
                        entry.flow = BookingFlow::Idle;
                        smallvec![Effect::None]
                    },
                    _ => {
                        entry.flow = heal(std::mem::take(&mut entry.flow), status);
                        smallvec![Effect::None]
                    },
                }
            },

            BookingAction::PaymentInitiated {
                correlation_id,
                intent,
            } => {
                if let Some(entry) = state.bookings.get_mut(&intent.booking_id) {
                    if finish(entry, correlation_id).is_some() {
                        tracing::info!(booking_id = %intent.booking_id, "Payment intent live");
                        entry.flow = BookingFlow::AwaitingPayment { intent };
                        entry.last_error = None;
                        entry.updated_at = now;
                    }
                }
                smallvec![Effect::None]
            },

            BookingAction::BookingsRefreshed { bookings, .. } => {
                tracing::debug!(count = bookings.len(), "Bookings refreshed");
                for booking in bookings {
                    if let Some(entry) = state.bookings.get(&booking.id) {
                        if entry.flow.is_busy() || is_stale(&entry.booking, &booking) {
                            tracing::debug!(booking_id = %booking.id, status = %booking.status, "Skipping outdated snapshot");
                            continue;
                        }
                    }
                    let status = booking.status;
                    let entry = apply_snapshot(state, booking, now);
                    entry.flow = heal(std::mem::take(&mut entry.flow), status);
                }
                smallvec![Effect::None]
            },

            BookingAction::RidesLoaded { rides, .. } => {
                for ride in rides {
                    state.rides.insert(ride.id, ride);
                }
                smallvec![Effect::None]
            },

            BookingAction::RideCompleted {
                correlation_id,
                ride,
            } => {
                if state.completing_rides.get(&ride.id) == Some(&correlation_id) {
                    state.completing_rides.remove(&ride.id);
                }
                tracing::info!(ride_id = %ride.id, "Ride completed");
                for entry in state.bookings.values_mut() {
                    if entry.booking.ride.id != ride.id {
                        continue;
                    }
                    entry.booking.ride.status = ride.status;
                    let booking = &mut entry.booking;
                    if let Ok(next) = Transition::Complete.apply(booking.status, booking.payment_method) {
                        booking.status = next;
                        entry.updated_at = now;
                    }
                }
                state.rides.insert(ride.id, ride);
                smallvec![Effect::None]
            },

            BookingAction::ReviewSubmitted { review, .. } => {
                tracing::info!(review_id = %review.id, rating = review.rating, "Review stored");
                smallvec![Effect::None]
            },

            BookingAction::CommandFailed {
                correlation_id,
                target,
                error,
            } => {
                match target {
                    Target::Booking(booking_id) => {
                        if let Some(entry) = state.bookings.get_mut(&booking_id) {
                            match finish(entry, correlation_id) {
                                // The charge went through; the server may or may not have recorded it
                                Some(Operation::ConfirmPayment { payment_intent_id })
                                    if error.leaves_outcome_unknown() =>
                                {
                                    tracing::warn!(%booking_id, error = %error, "Confirmation outcome unknown");
                                    open_reconciliation(entry, payment_intent_id, now);
                                },
                                _ => {
                                    entry.last_error = Some(error);
                                    entry.updated_at = now;
                                },
                            }
                        }
                    },
                    Target::Ride(ride_id) => {
                        if state.requests_in_flight.get(&ride_id) == Some(&correlation_id) {
                            state.requests_in_flight.remove(&ride_id);
                        }
                        if state.completing_rides.get(&ride_id) == Some(&correlation_id) {
                            state.completing_rides.remove(&ride_id);
                        }
                    },
                    Target::None => {},
                }
                smallvec![Effect::None]
            },
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn request_booking(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    ride: Ride,
    seats: u32,
    payment_method: PaymentMethod,
    locations: Option<Locations>,
) -> Result<Effects, BookingError> {
    let identity = signed_in(env)?;
    if ride.is_driven_by(identity.id) {
        return Err(BookingError::Validation("You cannot book your own ride".to_string()));
    }
    if identity.role == Role::Driver {
        return Err(BookingError::Validation("Drivers cannot book seats".to_string()));
    }
    if seats == 0 {
        return Err(BookingError::Validation("Book at least one seat".to_string()));
    }

    let ride_id = ride.id;
    if ride.status != RideStatus::Posted {
        return Err(BookingError::Validation(format!(
            "Ride {ride_id} is no longer open for booking"
        )));
    }
    if seats > ride.available_seats {
        return Err(BookingError::Validation(format!(
            "Only {} seat(s) left on this ride",
            ride.available_seats
        )));
    }
    // The caller's ride is the snapshot it just showed; it replaces ours
    state.rides.insert(ride_id, ride);

    if let Some((booking_id, intent)) = state.unreconciled_on_ride(ride_id) {
        return Err(BookingError::Reconciliation {
            booking_id,
            payment_intent_id: intent.to_string(),
        });
    }
    if let Some(entry) = state.active_booking(ride_id, identity.id) {
        return Err(BookingError::Validation(format!(
            "You already have booking {} on this ride",
            entry.booking.id
        )));
    }
    if state.requests_in_flight.contains_key(&ride_id) {
        return Err(BookingError::Conflict(
            "A booking request for this ride is already in progress".to_string(),
        ));
    }

    state.requests_in_flight.insert(ride_id, correlation_id);
    tracing::info!(%ride_id, seats, method = %payment_method, "Requesting booking");

    let request = BookingRequest {
        ride_id,
        seats_booked: seats,
        payment_method,
        locations,
    };
    Ok(smallvec![call(
        env.gateway().book(request),
        correlation_id,
        Target::Ride(ride_id),
        move |receipt| BookingAction::BookingRequested {
            correlation_id,
            receipt
        },
    )])
}

fn respond(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    booking_id: BookingId,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<Effects, BookingError> {
    let (identity, entry) = authorize(state, env, booking_id)?;
    if identity.role != Role::Driver {
        return Err(BookingError::Auth(
            "Only drivers can respond to booking requests".to_string(),
        ));
    }
    if !entry.booking.ride.is_driven_by(identity.id) {
        return Err(BookingError::Auth(
            "You can only respond to requests on your own rides".to_string(),
        ));
    }
    check(entry, decision.transition())?;

    begin(entry, Operation::Respond(decision), correlation_id, now);
    tracing::info!(%booking_id, decision = decision.as_str(), "Responding to booking request");
    Ok(smallvec![update(
        env.gateway().respond(booking_id, decision),
        correlation_id,
        booking_id,
    )])
}

fn cancel(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    booking_id: BookingId,
    now: DateTime<Utc>,
) -> Result<Effects, BookingError> {
    let (identity, entry) = authorize(state, env, booking_id)?;
    if !entry.booking.involves(identity.id) && identity.role != Role::Admin {
        return Err(BookingError::Auth(
            "Only the passenger or the driver can cancel this booking".to_string(),
        ));
    }
    if let Some(intent) = entry.flow.unreconciled_intent() {
        return Err(BookingError::Reconciliation {
            booking_id,
            payment_intent_id: intent.to_string(),
        });
    }
    check(entry, Transition::Cancel)?;

    begin(entry, Operation::Cancel, correlation_id, now);
    tracing::info!(%booking_id, "Cancelling booking");
    Ok(smallvec![update(env.gateway().cancel(booking_id), correlation_id, booking_id)])
}

fn settle_cash(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    booking_id: BookingId,
    now: DateTime<Utc>,
) -> Result<Effects, BookingError> {
    let (identity, entry) = authorize(state, env, booking_id)?;
    if !entry.booking.involves(identity.id) {
        return Err(BookingError::Auth(
            "Only the passenger or the driver can settle this booking".to_string(),
        ));
    }
    let method = entry.booking.payment_method;
    if method != PaymentMethod::Cash {
        return Err(BookingError::Validation(format!(
            "Booking {booking_id} is paid by {method}; complete it through the payment widget"
        )));
    }
    check(entry, Transition::ConfirmPayment)?;

    begin(entry, Operation::SettleCash, correlation_id, now);
    tracing::info!(%booking_id, "Settling cash payment");
    Ok(smallvec![update(
        env.gateway().settle(booking_id, PaymentMethod::Cash),
        correlation_id,
        booking_id,
    )])
}

fn initiate_payment(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    booking_id: BookingId,
    now: DateTime<Utc>,
) -> Result<Effects, BookingError> {
    let (identity, entry) = authorize(state, env, booking_id)?;
    if entry.booking.passenger.id != identity.id {
        return Err(BookingError::Auth(
            "Only the passenger can pay for this booking".to_string(),
        ));
    }
    let method = entry.booking.payment_method;
    if !method.requires_intent() {
        return Err(BookingError::Validation(format!(
            "Booking {booking_id} is paid in cash and settled directly"
        )));
    }
    if let Some(intent) = entry.flow.unreconciled_intent() {
        return Err(BookingError::Reconciliation {
            booking_id,
            payment_intent_id: intent.to_string(),
        });
    }
    if let Some(intent) = entry.flow.live_intent() {
        tracing::debug!(%booking_id, "Reusing live payment intent");
        return Ok(smallvec![Effect::emit(BookingAction::PaymentInitiated {
            correlation_id,
            intent: intent.clone(),
        })]);
    }
    check(entry, Transition::ConfirmPayment)?;
    let amount = entry.booking.fare_amount.ok_or_else(|| {
        BookingError::Unexpected(format!("Booking {booking_id} has no quoted fare"))
    })?;

    begin(entry, Operation::InitiatePayment, correlation_id, now);
    tracing::info!(%booking_id, %amount, %method, "Creating payment intent");

    let request = PaymentRequest {
        booking_id,
        amount,
        payment_method: method,
    };
    Ok(smallvec![call(
        env.gateway().process_payment(request),
        correlation_id,
        Target::Booking(booking_id),
        move |result| match result.client_secret {
            Some(secret) => BookingAction::PaymentInitiated {
                correlation_id,
                intent: PaymentIntent::new(booking_id, secret),
            },
            None => BookingAction::CommandFailed {
                correlation_id,
                target: Target::Booking(booking_id),
                error: BookingError::Payment(
                    "The payment processor did not return a client secret".to_string(),
                ),
            },
        },
    )])
}

fn confirm_payment(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    booking_id: BookingId,
    payment_intent_id: String,
    now: DateTime<Utc>,
) -> Result<Effects, BookingError> {
    let (identity, entry) = authorize(state, env, booking_id)?;
    if entry.booking.passenger.id != identity.id {
        return Err(BookingError::Auth(
            "Only the passenger can confirm this payment".to_string(),
        ));
    }
    if !entry.booking.payment_method.requires_intent() {
        return Err(BookingError::Validation(format!(
            "Booking {booking_id} is paid in cash and settled directly"
        )));
    }

    match &entry.flow {
        BookingFlow::Paid {
            payment_intent_id: confirmed,
        } => {
            if *confirmed == payment_intent_id {
                tracing::debug!(%booking_id, "Payment already confirmed");
                return Ok(smallvec![Effect::emit(BookingAction::BookingUpdated {
                    correlation_id,
                    booking: entry.booking.clone(),
                })]);
            }
            return Err(state_error(
                booking_id,
                IllegalTransition {
                    from: entry.booking.status,
                    transition: Transition::ConfirmPayment,
                },
            ));
        },
        BookingFlow::ReconciliationPending {
            payment_intent_id: pending,
        } if *pending != payment_intent_id => {
            return Err(BookingError::Validation(format!(
                "Booking {booking_id} is still awaiting confirmation of payment {pending}"
            )));
        },
        _ => {},
    }
    // A CONFIRMED booking without a locally known intent goes to the server,
    // which answers idempotently for the intent it recorded.
    if entry.booking.status != BookingStatus::Confirmed {
        check(entry, Transition::ConfirmPayment)?;
    }

    begin(
        entry,
        Operation::ConfirmPayment {
            payment_intent_id: payment_intent_id.clone(),
        },
        correlation_id,
        now,
    );
    tracing::info!(%booking_id, payment_intent_id = %payment_intent_id, "Confirming payment");
    Ok(smallvec![update(
        env.gateway().confirm_payment(booking_id, payment_intent_id),
        correlation_id,
        booking_id,
    )])
}

fn mark_ride_completed(
    state: &mut BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    ride_id: RideId,
) -> Result<Effects, BookingError> {
    let identity = signed_in(env)?;
    if identity.role != Role::Driver {
        return Err(BookingError::Auth("Only drivers can complete rides".to_string()));
    }
    if state.driver_of(ride_id).is_some_and(|driver| driver != identity.id) {
        return Err(BookingError::Auth("You can only complete your own rides".to_string()));
    }
    if state
        .rides
        .get(&ride_id)
        .is_some_and(|ride| ride.status == RideStatus::Completed)
    {
        return Err(BookingError::Validation(format!("Ride {ride_id} is already completed")));
    }
    if state.completing_rides.contains_key(&ride_id) {
        return Err(BookingError::Conflict(format!(
            "Ride {ride_id} is already being completed"
        )));
    }

    state.completing_rides.insert(ride_id, correlation_id);
    tracing::info!(%ride_id, "Completing ride");
    Ok(smallvec![call(
        env.gateway().complete_ride(ride_id),
        correlation_id,
        Target::Ride(ride_id),
        move |ride| BookingAction::RideCompleted {
            correlation_id,
            ride
        },
    )])
}

fn submit_review(
    state: &BookingState,
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    review: ReviewRequest,
) -> Result<Effects, BookingError> {
    let identity = signed_in(env)?;
    if !(1..=5).contains(&review.rating) {
        return Err(BookingError::Validation("Rating must be between 1 and 5".to_string()));
    }
    if review.reviewee_id == identity.id {
        return Err(BookingError::Validation("You cannot review yourself".to_string()));
    }
    let ride_id = review.ride_id;
    let eligible = state.has_completed_trip(ride_id, identity.id)
        || state.driver_of(ride_id) == Some(identity.id);
    if !eligible {
        return Err(BookingError::Validation(
            "You can review a ride once your trip on it is completed".to_string(),
        ));
    }

    tracing::info!(%ride_id, reviewee_id = %review.reviewee_id, "Submitting review");
    Ok(smallvec![call(
        env.gateway().add_review(review),
        correlation_id,
        Target::Ride(ride_id),
        move |review| BookingAction::ReviewSubmitted {
            correlation_id,
            review
        },
    )])
}

fn refresh(env: &BookingEnvironment, correlation_id: CorrelationId) -> Result<Effects, BookingError> {
    let identity = signed_in(env)?;
    let gateway = env.gateway();

    let request: GatewayFuture<Vec<Booking>> = if identity.role == Role::Passenger {
        gateway.my_bookings()
    } else {
        let mine = gateway.my_bookings();
        let requests = gateway.driver_requests();
        Box::pin(async move {
            let (mut bookings, requests) = futures::future::try_join(mine, requests).await?;
            for booking in requests {
                if !bookings.iter().any(|known| known.id == booking.id) {
                    bookings.push(booking);
                }
            }
            Ok(bookings)
        })
    };

    Ok(smallvec![call(request, correlation_id, Target::None, move |bookings| {
        BookingAction::BookingsRefreshed {
            correlation_id,
            bookings,
        }
    })])
}

fn search_rides(
    env: &BookingEnvironment,
    correlation_id: CorrelationId,
    search: RideSearch,
) -> Effects {
    tracing::debug!(source = %search.source, destination = %search.destination, "Searching rides");
    smallvec![call(
        env.gateway().search_rides(search),
        correlation_id,
        Target::None,
        move |rides| BookingAction::RidesLoaded {
            correlation_id,
            rides
        },
    )]
}

// ============================================================================
// Helpers
// ============================================================================

fn signed_in(env: &BookingEnvironment) -> Result<Identity, BookingError> {
    env.session()
        .current_user()
        .ok_or_else(|| BookingError::Auth("Sign in to continue".to_string()))
}

/// Session, lookup and busy check shared by booking commands
fn authorize<'s>(
    state: &'s mut BookingState,
    env: &BookingEnvironment,
    booking_id: BookingId,
) -> Result<(Identity, &'s mut BookingEntry), BookingError> {
    let identity = signed_in(env)?;
    let entry = state
        .bookings
        .get_mut(&booking_id)
        .ok_or_else(|| BookingError::NotFound(format!("Booking {booking_id}")))?;
    if entry.flow.is_busy() {
        return Err(BookingError::Conflict(format!(
            "Booking {booking_id} already has an operation in progress"
        )));
    }
    Ok((identity, entry))
}

fn check(entry: &BookingEntry, transition: Transition) -> Result<BookingStatus, BookingError> {
    transition
        .apply(entry.booking.status, entry.booking.payment_method)
        .map_err(|illegal| state_error(entry.booking.id, illegal))
}

const fn state_error(booking_id: BookingId, illegal: IllegalTransition) -> BookingError {
    BookingError::State {
        booking_id,
        status: illegal.from,
        attempted: illegal.transition,
    }
}

fn reject(correlation_id: CorrelationId, target: Target, error: BookingError) -> Effects {
    tracing::debug!(%correlation_id, ?target, error = %error, "Command rejected");
    smallvec![Effect::emit(BookingAction::CommandFailed {
        correlation_id,
        target,
        error,
    })]
}

fn begin(
    entry: &mut BookingEntry,
    operation: Operation,
    correlation_id: CorrelationId,
    now: DateTime<Utc>,
) {
    let resume = std::mem::take(&mut entry.flow);
    entry.flow = BookingFlow::InFlight {
        operation,
        correlation_id,
        resume: Box::new(resume),
    };
    entry.updated_at = now;
}

/// End the in-flight operation started by `correlation_id`, restoring the prior flow
fn finish(entry: &mut BookingEntry, correlation_id: CorrelationId) -> Option<Operation> {
    match std::mem::take(&mut entry.flow) {
        BookingFlow::InFlight {
            operation,
            correlation_id: started_by,
            resume,
        } if started_by == correlation_id => {
            entry.flow = *resume;
            Some(operation)
        },
        other => {
            entry.flow = other;
            None
        },
    }
}

/// Drop flow data that a server status has made stale
fn heal(flow: BookingFlow, status: BookingStatus) -> BookingFlow {
    match flow {
        BookingFlow::AwaitingPayment { .. }
            if !matches!(status, BookingStatus::Pending | BookingStatus::Approved) =>
        {
            BookingFlow::Idle
        },
        BookingFlow::ReconciliationPending { payment_intent_id }
            if matches!(status, BookingStatus::Confirmed | BookingStatus::Completed) =>
        {
            BookingFlow::Paid { payment_intent_id }
        },
        BookingFlow::ReconciliationPending { .. } if status.is_terminal() => BookingFlow::Idle,
        other => other,
    }
}

/// Record that a captured payment awaits server confirmation
///
/// A confirmation still in flight keeps running and falls back to the
/// reconciliation gap if it fails.
fn open_reconciliation(entry: &mut BookingEntry, payment_intent_id: String, now: DateTime<Utc>) {
    let booking_id = entry.booking.id;
    let pending = BookingFlow::ReconciliationPending {
        payment_intent_id: payment_intent_id.clone(),
    };
    match &mut entry.flow {
        BookingFlow::Paid { .. } => return,
        BookingFlow::InFlight { resume, .. } => **resume = pending,
        flow => *flow = pending,
    }
    tracing::error!(
        %booking_id,
        payment_intent_id = %payment_intent_id,
        "Payment captured but not confirmed by the server"
    );
    entry.last_error = Some(BookingError::Reconciliation {
        booking_id,
        payment_intent_id,
    });
    entry.updated_at = now;
}

/// Whether `snapshot` predates what we already know of the booking
fn is_stale(known: &Booking, snapshot: &Booking) -> bool {
    known.status != snapshot.status
        && snapshot.status.leads_to(known.status, snapshot.payment_method)
}

/// Store a server snapshot, applying seat accounting for the observed transition
fn apply_snapshot(
    state: &mut BookingState,
    booking: Booking,
    now: DateTime<Utc>,
) -> &mut BookingEntry {
    let previous = state.bookings.get(&booking.id).map(|entry| entry.booking.status);
    if let (Some(previous), Some(ride)) = (previous, state.rides.get_mut(&booking.ride.id)) {
        adjust_seats(ride, previous, booking.status, booking.seats_booked);
    }

    match state.bookings.entry(booking.id) {
        btree_map::Entry::Occupied(occupied) => {
            let entry = occupied.into_mut();
            entry.booking = booking;
            entry.last_error = None;
            entry.updated_at = now;
            entry
        },
        btree_map::Entry::Vacant(vacant) => vacant.insert(BookingEntry {
            booking,
            flow: BookingFlow::Idle,
            last_error: None,
            updated_at: now,
        }),
    }
}

/// Seats are held only while a booking is CONFIRMED
pub fn adjust_seats(ride: &mut Ride, from: BookingStatus, to: BookingStatus, seats: u32) {
    if from != BookingStatus::Confirmed && to == BookingStatus::Confirmed {
        ride.available_seats = ride.available_seats.saturating_sub(seats);
    } else if from == BookingStatus::Confirmed && to == BookingStatus::Cancelled {
        ride.available_seats = ride.available_seats.saturating_add(seats);
    }
}

fn call<T, S>(
    request: GatewayFuture<T>,
    correlation_id: CorrelationId,
    target: Target,
    on_success: S,
) -> Effect<BookingAction>
where
    T: Send + 'static,
    S: FnOnce(T) -> BookingAction + Send + 'static,
{
    Effect::task(async move {
        match request.await {
            Ok(value) => on_success(value),
            Err(error) => {
                tracing::warn!(%correlation_id, error = %error, "Gateway call failed");
                BookingAction::CommandFailed {
                    correlation_id,
                    target,
                    error: error.into(),
                }
            },
        }
    })
}

fn update(
    request: GatewayFuture<Booking>,
    correlation_id: CorrelationId,
    booking_id: BookingId,
) -> Effect<BookingAction> {
    call(request, correlation_id, Target::Booking(booking_id), move |booking| {
        BookingAction::BookingUpdated {
            correlation_id,
            booking,
        }
    })
}

/// Best-effort wallet release after a confirmed processor payment
fn release_wallet(
    gateway: Arc<dyn BookingGateway>,
    payment_intent_id: String,
) -> Effect<BookingAction> {
    Effect::Future(Box::pin(async move {
        match gateway.confirm_stripe(payment_intent_id.clone()).await {
            Ok(update) => {
                tracing::debug!(payment_intent_id = %payment_intent_id, message = %update.message, "Driver wallet updated");
            },
            Err(error) => {
                tracing::warn!(
                    payment_intent_id = %payment_intent_id,
                    error = %error,
                    "Wallet update failed; booking stays confirmed"
                );
            },
        }
        None
    }))
}
