//! Metric names and recorders for the booking runtime.
//!
//! The library only emits through the `metrics` facade. Applications that
//! want the numbers install a recorder of their choice and call
//! [`register_metrics`] once so descriptions are attached.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub use metrics::{counter, gauge, histogram};

/// Register all metric descriptions.
pub fn register_metrics() {
    // Store
    describe_counter!("store.commands.total", "Commands sent to the store");
    describe_counter!("store.effects.executed", "Effects executed, labelled by type");
    describe_counter!(
        "store.effects.discarded",
        "Effect results dropped because the store was shutting down"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the reducer per action"
    );

    // Bookings
    describe_counter!(
        "booking_commands_total",
        "Coordinator operations invoked, labelled by operation"
    );
    describe_counter!(
        "booking_command_failures_total",
        "Coordinator operations that returned an error, labelled by operation and kind"
    );
    describe_counter!(
        "booking_reconciliation_opened_total",
        "Payments captured by the processor that the server never confirmed"
    );
    describe_counter!(
        "booking_payments_confirmed_total",
        "Processor payments confirmed by the server"
    );

    // Notifications
    describe_counter!("notification_polls_total", "Notification polls completed");
    describe_counter!("notification_poll_failures_total", "Notification polls that failed");
    describe_gauge!("notifications_unread", "Unread notifications in the last poll");

    // Retry
    describe_counter!("retry.attempt", "Retries scheduled after a transient failure");
    describe_counter!("retry.success", "Operations that succeeded after at least one retry");
    describe_counter!("retry.exhausted", "Operations that failed after the last retry");
}

/// Booking coordinator metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record an operation being invoked.
    pub fn record_command(operation: &'static str) {
        counter!("booking_commands_total", "operation" => operation).increment(1);
    }

    /// Record an operation failure with the error kind.
    pub fn record_failure(operation: &'static str, kind: &'static str) {
        counter!(
            "booking_command_failures_total",
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
    }

    /// Record a booking entering the reconciliation gap.
    pub fn record_reconciliation_opened() {
        counter!("booking_reconciliation_opened_total").increment(1);
    }

    /// Record a confirmed processor payment.
    pub fn record_payment_confirmed() {
        counter!("booking_payments_confirmed_total").increment(1);
    }
}

/// Notification poller metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a successful poll and the unread count it returned.
    #[allow(clippy::cast_precision_loss)] // unread counts are small
    pub fn record_poll(unread: usize) {
        counter!("notification_polls_total").increment(1);
        gauge!("notifications_unread").set(unread as f64);
    }

    /// Record a failed poll.
    pub fn record_failure() {
        counter!("notification_poll_failures_total").increment(1);
    }
}
