//! Booking lifecycle demo
//!
//! Without `TRIPLY_API_URL` the demo runs a passenger and a driver against
//! the in-memory backend: a cash booking settled after approval, then a card
//! booking paid through a scripted widget. With `TRIPLY_API_URL` set it signs
//! in with `TRIPLY_TOKEN`/`TRIPLY_USER_ID`/`TRIPLY_ROLE` and lists what the
//! real backend holds for that user.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use triply_client::{ClientConfig, TriplyClient};
use triply_core::lifecycle::Decision;
use triply_core::session::SessionStore;
use triply_core::types::{Identity, PaymentMethod, RideId, RideSearch, Role, UserId};
use triply_runtime::{BookingCoordinator, BookingOutcome, CoordinatorConfig, PaymentOutcome};
use triply_testing::{MockGateway, ScriptedPaymentWidget, fixtures};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_flow=info,triply_runtime=info,triply_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CoordinatorConfig::from_env();
    if std::env::var("TRIPLY_API_URL").is_ok() {
        against_backend(config).await
    } else {
        offline(config).await
    }
}

/// Passenger and driver sharing the in-memory backend
async fn offline(config: CoordinatorConfig) -> Result<()> {
    println!("=== Triply booking lifecycle (in-memory backend) ===\n");

    let passenger_session = SessionStore::signed_in(fixtures::passenger());
    let driver_session = SessionStore::signed_in(fixtures::driver());
    let backend = MockGateway::new(passenger_session.clone())
        .with_ride(fixtures::ride(42, 3))
        .with_ride(fixtures::ride(43, 4));
    backend.set_latency(Duration::from_millis(50));

    let passenger = BookingCoordinator::new(Arc::new(backend.clone()), passenger_session, config.clone());
    let driver = BookingCoordinator::new(
        Arc::new(backend.acting_as(driver_session.clone())),
        driver_session,
        config,
    );

    let rides = passenger.search_rides(RideSearch::between("pune", "mumbai")).await?;
    let ride = rides.first().cloned().context("fixture ride not found")?;
    println!(
        "Found {} ride(s); taking ride {} {} → {} with {} seat(s)",
        rides.len(),
        ride.id,
        ride.source,
        ride.destination,
        ride.available_seats
    );

    // Cash: seats are only taken once the driver approves and cash is settled
    println!("\n>>> Passenger books 2 seats, paying cash");
    let cash = passenger
        .request_booking(ride.clone(), 2, PaymentMethod::Cash, None)
        .await?
        .booking()
        .clone();
    println!("Booking {} is {}", cash.id, cash.status);

    println!("\n>>> Driver approves");
    let approved = driver.respond_to_request(cash.id, Decision::Approved).await?;
    println!("Booking {} is {} ({} seat(s) left)", approved.id, approved.status, approved.ride.available_seats);

    println!("\n>>> Passenger settles cash");
    passenger.refresh_all().await?;
    let settled = passenger.settle_cash(cash.id).await?;
    println!("Booking {} is {} ({} seat(s) left)", settled.id, settled.status, settled.ride.available_seats);

    // Card: the booking comes back with an intent to pay right away
    println!("\n>>> Passenger books a seat on another ride by card");
    let ride = backend.ride(RideId::new(43)).context("second fixture ride not found")?;
    let outcome = passenger.request_booking(ride, 1, PaymentMethod::Stripe, None).await;
    match outcome {
        Ok(BookingOutcome::AwaitingPayment { booking, intent }) => {
            println!("Booking {} is {}; paying intent {}", booking.id, booking.status, intent.intent_id());
            let widget = ScriptedPaymentWidget::succeeding();
            match passenger.pay_with_widget(booking.id, &widget).await? {
                PaymentOutcome::Confirmed(paid) => println!("Booking {} is {}", paid.id, paid.status),
                PaymentOutcome::Abandoned => println!("Payment abandoned"),
            }
        },
        Ok(BookingOutcome::Booked(booking)) => println!("Booking {} is {}", booking.id, booking.status),
        Err(error) => println!("Booking refused: {}", error.user_message()),
    }

    println!("\n>>> Driver completes the ride");
    driver.refresh_all().await?;
    let completed = driver.mark_completed(RideId::new(42)).await?;
    println!("Ride {} is {:?}", completed.id, completed.status);

    passenger.refresh_all().await?;
    let review = passenger
        .submit_review(completed.id, fixtures::DRIVER_ID, 5, "On time and friendly")
        .await?;
    println!("Review {} stored ({} stars)", review.id, review.rating);

    println!("\nFinal bookings:");
    for booking in passenger.bookings().await {
        println!("  #{} {} seat(s) {} {}", booking.id, booking.seats_booked, booking.payment_method, booking.status);
    }

    passenger.shutdown().await?;
    driver.shutdown().await?;
    Ok(())
}

/// Read-only tour of a real backend
async fn against_backend(config: CoordinatorConfig) -> Result<()> {
    let client_config = ClientConfig::from_env();
    println!("=== Triply booking lifecycle ({}) ===\n", client_config.base_url);

    let session = SessionStore::new();
    if let Ok(token) = std::env::var("TRIPLY_TOKEN") {
        session.sign_in(identity_from_env(token)?);
    }

    let client = TriplyClient::new(client_config, session.clone())?;
    let coordinator = BookingCoordinator::new(Arc::new(client), session, config);

    let bookings = coordinator.refresh_all().await?;
    println!("{} booking(s):", bookings.len());
    for booking in &bookings {
        println!(
            "  #{} ride {} {} → {} {}",
            booking.id, booking.ride.id, booking.ride.source, booking.ride.destination, booking.status
        );
    }

    let poller = coordinator.start_notifications();
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("{} unread notification(s)", poller.unread_count());
    poller.stop();

    coordinator.shutdown().await?;
    Ok(())
}

fn identity_from_env(token: String) -> Result<Identity> {
    let id = std::env::var("TRIPLY_USER_ID")
        .context("TRIPLY_USER_ID is required with TRIPLY_TOKEN")?
        .parse::<u64>()
        .context("TRIPLY_USER_ID must be numeric")?;
    let role = match std::env::var("TRIPLY_ROLE").unwrap_or_default().to_uppercase().as_str() {
        "DRIVER" => Role::Driver,
        "ADMIN" => Role::Admin,
        _ => Role::Passenger,
    };
    Ok(Identity {
        id: UserId::new(id),
        name: std::env::var("TRIPLY_USER_NAME").unwrap_or_else(|_| "Triply user".to_string()),
        email: std::env::var("TRIPLY_USER_EMAIL").unwrap_or_default(),
        role,
        token: Some(token),
    })
}
