//! Canned identities and rides shared by tests and the demo.

use chrono::{NaiveDate, NaiveDateTime};
use triply_core::types::{Identity, Money, Person, Ride, RideId, RideStatus, Role, UserId};

/// Default passenger
pub const PASSENGER_ID: UserId = UserId::new(1);
/// A second passenger competing for seats
pub const OTHER_PASSENGER_ID: UserId = UserId::new(2);
/// Default driver
pub const DRIVER_ID: UserId = UserId::new(9);
/// Back-office user
pub const ADMIN_ID: UserId = UserId::new(99);

/// Signed-in passenger
#[must_use]
pub fn passenger() -> Identity {
    identity(PASSENGER_ID, "Asha Rao", Role::Passenger)
}

/// Another signed-in passenger
#[must_use]
pub fn other_passenger() -> Identity {
    identity(OTHER_PASSENGER_ID, "Vikram Shah", Role::Passenger)
}

/// Signed-in driver
#[must_use]
pub fn driver() -> Identity {
    identity(DRIVER_ID, "Meera Iyer", Role::Driver)
}

/// Signed-in admin
#[must_use]
pub fn admin() -> Identity {
    identity(ADMIN_ID, "Ops", Role::Admin)
}

fn identity(id: UserId, name: &str, role: Role) -> Identity {
    let login = name.split_whitespace().next().unwrap_or(name).to_lowercase();
    Identity {
        id,
        name: name.to_string(),
        email: format!("{login}@triply.test"),
        role,
        token: Some(format!("token-{id}")),
    }
}

/// How an identity appears inside rides and bookings
#[must_use]
pub fn person(identity: &Identity) -> Person {
    Person {
        id: identity.id,
        name: identity.name.clone(),
        email: Some(identity.email.clone()),
        phone: None,
        vehicle_model: (identity.role == Role::Driver).then(|| "Maruti Ertiga".to_string()),
    }
}

/// Departure used by every fixture ride
#[must_use]
pub fn departure() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 14)
        .and_then(|date| date.and_hms_opt(8, 30, 0))
        .unwrap_or_default()
}

/// Pune → Mumbai ride driven by [`driver`], 150.00 per seat
#[must_use]
pub fn ride(id: u64, seats: u32) -> Ride {
    Ride {
        id: RideId::new(id),
        source: "Pune".to_string(),
        destination: "Mumbai".to_string(),
        departure_time: departure(),
        available_seats: seats,
        fare_per_seat: Money::from_major(150),
        driver: person(&driver()),
        status: RideStatus::Posted,
        source_lat: Some(18.5204),
        source_lng: Some(73.8567),
        dest_lat: Some(19.0760),
        dest_lng: Some(72.8777),
    }
}
