//! Explicit session store.
//!
//! A cheap-to-clone handle over a `tokio::sync::watch` channel. Every clone
//! observes the same identity; observers subscribe and drop their
//! subscription to stop listening.

use std::sync::Arc;
use tokio::sync::watch;

use crate::types::Identity;

/// Holds the signed-in identity, if any
#[derive(Clone, Debug)]
pub struct SessionStore {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl SessionStore {
    /// Create a signed-out session
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a session already signed in as `identity`
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        let session = Self::new();
        session.sign_in(identity);
        session
    }

    /// The signed-in identity
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    /// Whether someone is signed in
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Bearer token of the signed-in identity
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.sender
            .borrow()
            .as_ref()
            .and_then(|identity| identity.token.clone())
    }

    /// Replace the identity and notify subscribers
    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(user_id = %identity.id, role = %identity.role, "Signed in");
        self.sender.send_replace(Some(identity));
    }

    /// Clear the identity and notify subscribers
    pub fn sign_out(&self) {
        if self.sender.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
    }

    /// Observe identity changes; drop the subscription to unsubscribe
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of [`SessionStore::subscribe`]
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<Identity>>,
}

impl SessionSubscription {
    /// Identity currently signed in
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change
    ///
    /// Returns `None` once every [`SessionStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Option<Option<Identity>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Role, UserId};

    fn identity() -> Identity {
        Identity {
            id: UserId::new(1),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            role: Role::Passenger,
            token: Some("jwt".to_string()),
        }
    }

    #[test]
    fn test_clones_share_identity() {
        let session = SessionStore::new();
        let other = session.clone();
        assert!(!other.is_logged_in());

        session.sign_in(identity());
        assert_eq!(other.current_user().map(|i| i.id), Some(UserId::new(1)));
        assert_eq!(other.bearer_token().as_deref(), Some("jwt"));

        other.sign_out();
        assert!(!session.is_logged_in());
        assert_eq!(session.bearer_token(), None);
    }

    #[tokio::test]
    async fn test_subscription_sees_sign_in_and_out() {
        let session = SessionStore::new();
        let mut subscription = session.subscribe();

        session.sign_in(identity());
        let seen = subscription.changed().await.unwrap();
        assert_eq!(seen.map(|i| i.role), Some(Role::Passenger));

        session.sign_out();
        assert_eq!(subscription.changed().await, Some(None));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_store_dropped() {
        let session = SessionStore::new();
        let mut subscription = session.subscribe();
        drop(session);
        assert_eq!(subscription.changed().await, None);
    }
}
