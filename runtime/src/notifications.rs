//! Notification polling bound to the session lifecycle.
//!
//! A single task polls `GET /notifications` on a fixed interval while a user
//! is signed in. Signing out pauses polling and clears the list; signing in
//! polls immediately. Each successful response replaces the list, so the
//! last response wins. Failed polls are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use triply_core::error::BookingError;
use triply_core::gateway::BookingGateway;
use triply_core::session::{SessionStore, SessionSubscription};
use triply_core::types::{Notification, NotificationId};

use crate::metrics::NotificationMetrics;

/// Handle to the polling task
///
/// Dropping the handle stops polling.
pub struct NotificationPoller {
    task: JoinHandle<()>,
    latest: watch::Receiver<Vec<Notification>>,
    gateway: Arc<dyn BookingGateway>,
}

impl NotificationPoller {
    /// Start polling for whoever is signed in to `session`
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(
        gateway: Arc<dyn BookingGateway>,
        session: &SessionStore,
        interval: Duration,
    ) -> Self {
        let (sender, latest) = watch::channel(Vec::new());
        let task = tokio::spawn(poll_loop(
            Arc::clone(&gateway),
            session.subscribe(),
            interval,
            sender,
        ));
        Self {
            task,
            latest,
            gateway,
        }
    }

    /// Notifications from the last successful poll
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.latest.borrow().clone()
    }

    /// Number of unread notifications from the last successful poll
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.latest.borrow().iter().filter(|n| !n.read).count()
    }

    /// Watch the notification list
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.latest.clone()
    }

    /// Mark a notification read on the server
    ///
    /// The local list picks up the change on the next poll.
    ///
    /// # Errors
    ///
    /// Gateway errors converted to [`BookingError`].
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification, BookingError> {
        self.gateway
            .mark_notification_read(id)
            .await
            .map_err(BookingError::from)
    }

    /// Whether the polling task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop polling
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for NotificationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPoller")
            .field("running", &self.is_running())
            .field("notifications", &self.latest.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    gateway: Arc<dyn BookingGateway>,
    mut subscription: SessionSubscription,
    interval: Duration,
    sender: watch::Sender<Vec<Notification>>,
) {
    let mut signed_in = subscription.current().is_some();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            change = subscription.changed() => {
                let Some(identity) = change else {
                    tracing::debug!("Session closed, notification polling stopped");
                    return;
                };
                signed_in = identity.is_some();
                if signed_in {
                    tracing::debug!("Signed in, polling notifications");
                    ticker.reset_immediately();
                } else {
                    tracing::debug!("Signed out, notification polling paused");
                    sender.send_replace(Vec::new());
                }
            },
            _ = ticker.tick(), if signed_in => {
                match gateway.notifications().await {
                    // A sign-out while the request was in flight discards it
                    Ok(_) if subscription.current().is_none() => {},
                    Ok(notifications) => {
                        let unread = notifications.iter().filter(|n| !n.read).count();
                        tracing::trace!(count = notifications.len(), unread, "Notifications polled");
                        NotificationMetrics::record_poll(unread);
                        sender.send_replace(notifications);
                    },
                    Err(error) => {
                        tracing::warn!(error = %error, "Notification poll failed");
                        NotificationMetrics::record_failure();
                    },
                }
            },
        }
    }
}
