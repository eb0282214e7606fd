//! Property-based testing strategies for booking domain types.

use proptest::prelude::*;
use triply_core::lifecycle::{BookingStatus, Decision};
use triply_core::types::PaymentMethod;

/// Any booking status
pub fn any_status() -> impl Strategy<Value = BookingStatus> {
    prop::sample::select(BookingStatus::ALL.to_vec())
}

/// Any payment method
pub fn any_payment_method() -> impl Strategy<Value = PaymentMethod> {
    prop::sample::select(vec![
        PaymentMethod::Cash,
        PaymentMethod::Stripe,
        PaymentMethod::Netbanking,
    ])
}

/// Any driver decision
pub fn any_decision() -> impl Strategy<Value = Decision> {
    prop::sample::select(vec![Decision::Approved, Decision::Rejected])
}

/// One step a passenger or driver can take against the backend
#[derive(Clone, Debug)]
pub enum Step {
    /// Passenger books seats
    Book {
        /// Seats requested
        seats: u32,
        /// Payment method
        method: PaymentMethod,
    },
    /// Driver answers the n-th booking
    Respond {
        /// Index into the bookings made so far
        booking: usize,
        /// Decision
        decision: Decision,
    },
    /// Passenger pays the n-th booking (cash settlement or intent confirmation)
    Pay {
        /// Index into the bookings made so far
        booking: usize,
    },
    /// Passenger cancels the n-th booking
    Cancel {
        /// Index into the bookings made so far
        booking: usize,
    },
}

/// Random lifecycle steps, valid or not
pub fn any_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1..=3_u32, any_payment_method()).prop_map(|(seats, method)| Step::Book { seats, method }),
        (0..6_usize, any_decision()).prop_map(|(booking, decision)| Step::Respond { booking, decision }),
        (0..6_usize).prop_map(|booking| Step::Pay { booking }),
        (0..6_usize).prop_map(|booking| Step::Cancel { booking }),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::gateway::MockGateway;
    use triply_core::gateway::BookingGateway;
    use triply_core::session::SessionStore;
    use triply_core::types::{BookingId, BookingRequest, RideId};

    const SEATS: u32 = 6;

    async fn play(steps: Vec<Step>) -> MockGateway {
        let passenger = SessionStore::signed_in(fixtures::passenger());
        let backend = MockGateway::new(passenger).with_ride(fixtures::ride(42, SEATS));
        let driver = backend.acting_as(SessionStore::signed_in(fixtures::driver()));
        let mut booked: Vec<(BookingId, PaymentMethod)> = Vec::new();

        for step in steps {
            match step {
                Step::Book { seats, method } => {
                    let request = BookingRequest {
                        ride_id: RideId::new(42),
                        seats_booked: seats,
                        payment_method: method,
                        locations: None,
                    };
                    if let Ok(receipt) = backend.book(request).await {
                        booked.push((receipt.booking().id, method));
                    }
                },
                Step::Respond { booking, decision } => {
                    if let Some((id, _)) = booked.get(booking) {
                        let _ = driver.respond(*id, decision).await;
                    }
                },
                Step::Pay { booking } => {
                    if let Some((id, method)) = booked.get(booking) {
                        let _ = if method.requires_intent() {
                            backend.confirm_payment(*id, format!("pi_{id}")).await
                        } else {
                            backend.settle(*id, *method).await
                        };
                    }
                },
                Step::Cancel { booking } => {
                    if let Some((id, _)) = booked.get(booking) {
                        let _ = backend.cancel(*id).await;
                    }
                },
            }
        }
        backend
    }

    proptest! {
        #[test]
        fn prop_seats_are_held_only_by_confirmed_bookings(steps in prop::collection::vec(any_step(), 0..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let backend = runtime.block_on(play(steps));

            let held: u32 = (1..=24)
                .filter_map(|id| backend.booking(BookingId::new(id)))
                .filter(|booking| booking.status == BookingStatus::Confirmed)
                .map(|booking| booking.seats_booked)
                .sum();
            let available = backend.ride(RideId::new(42)).unwrap().available_seats;
            prop_assert_eq!(available + held, SEATS);
        }
    }
}
