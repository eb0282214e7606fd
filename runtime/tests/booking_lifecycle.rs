//! End-to-end booking lifecycle against the in-memory backend.
//!
//! Passenger and driver each run their own coordinator over the same
//! backend, the way two apps talk to one server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;
use triply_core::booking::BookingFlow;
use triply_core::error::{BookingError, GatewayError};
use triply_core::lifecycle::{BookingStatus, Decision, Transition};
use triply_core::payment::WidgetOutcome;
use triply_core::session::SessionStore;
use triply_core::types::{BookingId, PaymentMethod, Ride, RideId, RideSearch};
use triply_runtime::{BookingCoordinator, BookingOutcome, CoordinatorConfig, PaymentOutcome};
use triply_testing::{Endpoint, MockGateway, ScriptedPaymentWidget, fixtures, init_tracing};

// ============================================================================
// Test Fixtures
// ============================================================================

const RIDE: RideId = RideId::new(42);

struct World {
    backend: MockGateway,
    passenger: BookingCoordinator,
    driver: BookingCoordinator,
}

impl World {
    fn new(seats: u32) -> Self {
        Self::with_action_timeout(seats, Duration::from_secs(5))
    }

    fn with_action_timeout(seats: u32, timeout: Duration) -> Self {
        init_tracing();
        let config = CoordinatorConfig::default()
            .with_action_timeout(timeout)
            .with_confirm_retries(3, Duration::from_millis(1));

        let passenger_session = SessionStore::signed_in(fixtures::passenger());
        let driver_session = SessionStore::signed_in(fixtures::driver());
        let backend = MockGateway::new(passenger_session.clone()).with_ride(fixtures::ride(RIDE.get(), seats));
        let driver_backend = backend.acting_as(driver_session.clone());

        Self {
            passenger: BookingCoordinator::new(Arc::new(backend.clone()), passenger_session, config.clone()),
            driver: BookingCoordinator::new(Arc::new(driver_backend), driver_session, config),
            backend,
        }
    }

    fn ride(&self) -> Ride {
        self.backend.ride(RIDE).unwrap()
    }

    async fn book(&self, seats: u32, method: PaymentMethod) -> BookingOutcome {
        self.passenger
            .request_booking(self.ride(), seats, method, None)
            .await
            .unwrap()
    }

    /// Wait for the passenger's in-flight call on `booking_id` to land
    async fn passenger_settled(&self, booking_id: BookingId) {
        for _ in 0..200 {
            if !self.passenger.is_busy(booking_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("booking {booking_id} never settled");
    }
}

// ============================================================================
// Cash bookings
// ============================================================================

#[tokio::test]
async fn test_cash_booking_takes_seats_only_on_settlement() {
    let world = World::new(3);

    let outcome = world.book(2, PaymentMethod::Cash).await;
    let BookingOutcome::Booked(booking) = outcome else {
        panic!("cash bookings carry no intent");
    };
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(world.backend.ride(RIDE).unwrap().available_seats, 3);

    let approved = world
        .driver
        .respond_to_request(booking.id, Decision::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(approved.ride.available_seats, 3);

    world.passenger.refresh_all().await.unwrap();
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 3);
    let confirmed = world.passenger.settle_cash(booking.id).await.unwrap();

    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 1);
    assert_eq!(confirmed.ride.available_seats, 1);
    assert_eq!(world.backend.ride(RIDE).unwrap().available_seats, 1);
    assert_eq!(
        world.passenger.flow(booking.id).await,
        Some(BookingFlow::Idle)
    );
}

#[tokio::test]
async fn test_rejected_booking_cannot_be_cancelled() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Cash).await.booking().clone();

    world
        .driver
        .respond_to_request(booking.id, Decision::Rejected)
        .await
        .unwrap();
    world.passenger.refresh_all().await.unwrap();
    let cancels_before = world.backend.calls(Endpoint::Cancel);

    let error = world.passenger.cancel(booking.id).await.unwrap_err();

    assert_eq!(
        error,
        BookingError::State {
            booking_id: booking.id,
            status: BookingStatus::Rejected,
            attempted: Transition::Cancel,
        }
    );
    assert_eq!(world.backend.calls(Endpoint::Cancel), cancels_before);
    assert_eq!(
        world.passenger.booking(booking.id).await.map(|b| b.status),
        Some(BookingStatus::Rejected)
    );
}

#[tokio::test]
async fn test_cancelling_a_cancelled_booking_is_a_state_error() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Cash).await.booking().clone();

    let cancelled = world.passenger.cancel(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let error = world.passenger.cancel(booking.id).await.unwrap_err();
    assert!(matches!(error, BookingError::State { .. }), "got {error:?}");
    assert_eq!(world.backend.calls(Endpoint::Cancel), 1);
}

#[tokio::test]
async fn test_too_many_seats_is_rejected_before_the_network() {
    let world = World::new(2);

    let error = world
        .passenger
        .request_booking(world.ride(), 3, PaymentMethod::Cash, None)
        .await
        .unwrap_err();

    assert!(matches!(error, BookingError::Validation(_)), "got {error:?}");
    assert_eq!(world.backend.calls(Endpoint::Book), 0);
}

#[tokio::test]
async fn test_sold_out_on_the_server_is_a_conflict() {
    let world = World::new(3);
    let stale = world.ride();
    // Another passenger took the seats after our snapshot was loaded
    world.backend.add_ride(fixtures::ride(RIDE.get(), 1));

    let error = world
        .passenger
        .request_booking(stale, 2, PaymentMethod::Cash, None)
        .await
        .unwrap_err();

    assert!(matches!(error, BookingError::Conflict(_)), "got {error:?}");
    assert_eq!(world.backend.calls(Endpoint::Book), 1);
    // The conflict reloads the ride so the next attempt sees the real count
    assert_eq!(world.backend.calls(Endpoint::SearchRides), 1);
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 1);
}

#[tokio::test]
async fn test_request_checks_the_ride_it_was_given() {
    let world = World::new(3);
    world
        .passenger
        .search_rides(RideSearch::between("pune", "mumbai"))
        .await
        .unwrap();

    let error = world
        .passenger
        .request_booking(fixtures::ride(RIDE.get(), 1), 2, PaymentMethod::Cash, None)
        .await
        .unwrap_err();

    assert!(matches!(error, BookingError::Validation(_)), "got {error:?}");
    assert_eq!(world.backend.calls(Endpoint::Book), 0);
}

#[tokio::test]
async fn test_fresh_ride_replaces_outdated_listing() {
    let world = World::new(1);
    world
        .passenger
        .search_rides(RideSearch::between("pune", "mumbai"))
        .await
        .unwrap();
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 1);
    // The driver added seats after our listing was loaded
    world.backend.add_ride(fixtures::ride(RIDE.get(), 3));

    let booking = world.book(2, PaymentMethod::Cash).await.booking().clone();

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 3);
}

#[tokio::test]
async fn test_search_seeds_local_ride_snapshots() {
    let world = World::new(3);
    world.backend.add_ride(Ride {
        destination: "Nashik".to_string(),
        ..fixtures::ride(43, 4)
    });

    let rides = world
        .passenger
        .search_rides(RideSearch::between("pune", "mumbai"))
        .await
        .unwrap();

    assert_eq!(rides.iter().map(|ride| ride.id).collect::<Vec<_>>(), vec![RIDE]);
    assert_eq!(world.passenger.ride(RIDE).await.unwrap().available_seats, 3);
    assert!(world.passenger.ride(RideId::new(43)).await.is_none());
}

#[tokio::test]
async fn test_concurrent_responses_serialize() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Cash).await.booking().clone();
    world.driver.refresh_all().await.unwrap();

    let (approve, reject) = tokio::join!(
        world.driver.respond_to_request(booking.id, Decision::Approved),
        world.driver.respond_to_request(booking.id, Decision::Rejected),
    );

    let outcomes = [approve, reject];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1, "exactly one response wins: {outcomes:?}");
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(
        matches!(loser, BookingError::State { .. } | BookingError::Conflict(_)),
        "got {loser:?}"
    );
    assert_eq!(world.backend.calls(Endpoint::Respond), 1);
}

#[tokio::test]
async fn test_unknown_booking_is_loaded_before_acting() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Cash).await.booking().clone();

    // The driver's coordinator has never seen this booking
    assert!(world.driver.booking(booking.id).await.is_none());
    let approved = world
        .driver
        .respond_to_request(booking.id, Decision::Approved)
        .await
        .unwrap();

    assert_eq!(approved.status, BookingStatus::Approved);
    assert!(world.backend.calls(Endpoint::DriverRequests) >= 1);

    let missing = world.driver.cancel(BookingId::new(999)).await.unwrap_err();
    assert!(matches!(missing, BookingError::NotFound(_)), "got {missing:?}");
}

#[tokio::test]
async fn test_completed_ride_completes_confirmed_bookings() {
    let world = World::new(3);
    let booking = world.book(2, PaymentMethod::Cash).await.booking().clone();
    world
        .driver
        .respond_to_request(booking.id, Decision::Approved)
        .await
        .unwrap();
    world.passenger.refresh_all().await.unwrap();
    world.passenger.settle_cash(booking.id).await.unwrap();
    world.driver.refresh_all().await.unwrap();

    world.driver.mark_completed(RIDE).await.unwrap();

    assert_eq!(
        world.driver.booking(booking.id).await.map(|b| b.status),
        Some(BookingStatus::Completed)
    );
    world.passenger.refresh_all().await.unwrap();
    let review = world
        .passenger
        .submit_review(RIDE, fixtures::DRIVER_ID, 5, "Smooth drive")
        .await
        .unwrap();
    assert_eq!(review.rating, 5);
    assert_eq!(
        world.passenger.user_reviews(fixtures::DRIVER_ID).await.unwrap().len(),
        1
    );
}

// ============================================================================
// Card payments
// ============================================================================

#[tokio::test]
async fn test_card_payment_confirms_once() {
    let world = World::new(3);
    let BookingOutcome::AwaitingPayment { booking, intent } = world.book(2, PaymentMethod::Stripe).await else {
        panic!("card bookings carry an intent");
    };
    assert_eq!(intent.booking_id, booking.id);

    let widget = ScriptedPaymentWidget::succeeding_with("pi_123");
    let outcome = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap();

    let PaymentOutcome::Confirmed(confirmed) = outcome else {
        panic!("widget succeeded");
    };
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(world.backend.confirmed_intent(booking.id).as_deref(), Some("pi_123"));
    assert_eq!(world.backend.ride(RIDE).unwrap().available_seats, 1);

    let again = world
        .passenger
        .confirm_payment(booking.id, "pi_123".to_string())
        .await
        .unwrap();
    assert_eq!(again.status, BookingStatus::Confirmed);
    assert_eq!(world.backend.calls(Endpoint::ConfirmPayment), 1);
    assert_eq!(world.backend.intents_created(), 1);
}

#[tokio::test]
async fn test_declined_payment_keeps_the_intent() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Stripe).await.booking().clone();

    let widget = ScriptedPaymentWidget::declining("card declined");
    let error = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();
    assert_eq!(error, BookingError::Payment("card declined".to_string()));
    assert!(matches!(
        world.passenger.flow(booking.id).await,
        Some(BookingFlow::AwaitingPayment { .. })
    ));

    // The retry reuses the live intent
    let outcome = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Confirmed(_)));
    assert_eq!(world.backend.calls(Endpoint::ProcessPayment), 0);
    assert_eq!(world.backend.intents_created(), 1);
}

#[tokio::test]
async fn test_abandoned_payment_drops_the_intent() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Netbanking).await.booking().clone();

    let widget = ScriptedPaymentWidget::abandoning();
    let outcome = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Abandoned);
    assert_eq!(world.passenger.flow(booking.id).await, Some(BookingFlow::Idle));

    // Paying again needs a fresh intent
    let intent = world.passenger.initiate_payment(booking.id).await.unwrap();
    assert_eq!(world.backend.calls(Endpoint::ProcessPayment), 1);
    assert_eq!(intent.intent_id(), "pi_mock_2");
}

#[tokio::test]
async fn test_confirmation_outage_opens_reconciliation() {
    let world = World::new(3);
    let booking = world.book(2, PaymentMethod::Stripe).await.booking().clone();
    world.backend.fail_times(
        Endpoint::ConfirmPayment,
        4,
        GatewayError::Network("connection reset".to_string()),
    );

    let widget = ScriptedPaymentWidget::scripted([WidgetOutcome::Succeeded {
        payment_intent_id: "pi_mock_1".to_string(),
    }]);
    let error = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();

    assert_eq!(
        error,
        BookingError::Reconciliation {
            booking_id: booking.id,
            payment_intent_id: "pi_mock_1".to_string(),
        }
    );
    assert_eq!(world.backend.calls(Endpoint::ConfirmPayment), 4);
    assert_eq!(
        world.passenger.flow(booking.id).await,
        Some(BookingFlow::ReconciliationPending {
            payment_intent_id: "pi_mock_1".to_string()
        })
    );

    // The gap blocks anything that could charge twice or lose the payment
    let cancel = world.passenger.cancel(booking.id).await.unwrap_err();
    assert!(matches!(cancel, BookingError::Reconciliation { .. }), "got {cancel:?}");
    let pay = world.passenger.initiate_payment(booking.id).await.unwrap_err();
    assert!(matches!(pay, BookingError::Reconciliation { .. }), "got {pay:?}");
    let rebook = world
        .passenger
        .request_booking(world.ride(), 1, PaymentMethod::Stripe, None)
        .await
        .unwrap_err();
    assert!(matches!(rebook, BookingError::Reconciliation { .. }), "got {rebook:?}");

    let confirmed = world.passenger.retry_confirmation(booking.id).await.unwrap();

    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(world.backend.confirmed_intent(booking.id).as_deref(), Some("pi_mock_1"));
    assert_eq!(world.backend.calls(Endpoint::ProcessPayment), 0);
    assert_eq!(world.backend.intents_created(), 1);
    assert!(matches!(
        world.passenger.retry_confirmation(booking.id).await,
        Err(BookingError::Validation(_))
    ));
}

#[tokio::test]
async fn test_slow_confirmation_is_never_charged_twice() {
    let world = World::with_action_timeout(3, Duration::from_millis(50));
    let booking = world.book(2, PaymentMethod::Stripe).await.booking().clone();
    world.backend.set_latency(Duration::from_millis(300));
    // The server eventually drops the call without recording the payment
    world.backend.fail_next(
        Endpoint::ConfirmPayment,
        GatewayError::Network("connection reset".to_string()),
    );

    let widget = ScriptedPaymentWidget::succeeding_with("pi_mock_1");
    let error = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();

    let gap = BookingError::Reconciliation {
        booking_id: booking.id,
        payment_intent_id: "pi_mock_1".to_string(),
    };
    assert_eq!(error, gap);
    world.passenger_settled(booking.id).await;
    assert_eq!(
        world.passenger.flow(booking.id).await,
        Some(BookingFlow::ReconciliationPending {
            payment_intent_id: "pi_mock_1".to_string()
        })
    );
    assert_eq!(world.backend.calls(Endpoint::ConfirmPayment), 1);

    let again = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();
    assert!(matches!(again, BookingError::Reconciliation { .. }), "got {again:?}");
    assert_eq!(widget.calls(), 1);
    assert_eq!(world.backend.calls(Endpoint::ProcessPayment), 0);

    world.backend.set_latency(Duration::ZERO);
    let confirmed = world.passenger.retry_confirmation(booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(world.backend.intents_created(), 1);
}

#[tokio::test]
async fn test_late_confirmation_still_lands() {
    let world = World::with_action_timeout(3, Duration::from_millis(50));
    let booking = world.book(2, PaymentMethod::Stripe).await.booking().clone();
    world.backend.set_latency(Duration::from_millis(300));

    let widget = ScriptedPaymentWidget::succeeding_with("pi_mock_1");
    let error = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();
    assert!(matches!(error, BookingError::Reconciliation { .. }), "got {error:?}");

    world.passenger_settled(booking.id).await;
    assert_eq!(
        world.passenger.flow(booking.id).await,
        Some(BookingFlow::Paid {
            payment_intent_id: "pi_mock_1".to_string()
        })
    );
    assert_eq!(
        world.passenger.booking(booking.id).await.map(|b| b.status),
        Some(BookingStatus::Confirmed)
    );
    assert_eq!(world.backend.calls(Endpoint::ConfirmPayment), 1);
    assert_eq!(world.backend.confirmed_intent(booking.id).as_deref(), Some("pi_mock_1"));
}

#[tokio::test]
async fn test_cash_booking_cannot_use_the_widget() {
    let world = World::new(3);
    let booking = world.book(1, PaymentMethod::Cash).await.booking().clone();

    let widget = ScriptedPaymentWidget::succeeding();
    let error = world.passenger.pay_with_widget(booking.id, &widget).await.unwrap_err();

    assert!(matches!(error, BookingError::Validation(_)), "got {error:?}");
    assert_eq!(widget.calls(), 0);
}

// ============================================================================
// Sessions and shutdown
// ============================================================================

#[tokio::test]
async fn test_signed_out_operations_fail_with_auth() {
    let world = World::new(3);
    world.passenger.session().sign_out();

    let error = world
        .passenger
        .request_booking(world.ride(), 1, PaymentMethod::Cash, None)
        .await
        .unwrap_err();

    assert!(matches!(error, BookingError::Auth(_)), "got {error:?}");
    assert_eq!(world.backend.total_calls(), 0);
}

#[tokio::test]
async fn test_shutdown_rejects_new_operations() {
    let world = World::new(3);
    world.passenger.shutdown().await.unwrap();

    let error = world.passenger.refresh_all().await.unwrap_err();

    assert!(matches!(error, BookingError::Unexpected(_)), "got {error:?}");
}
