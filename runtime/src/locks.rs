//! Keyed async locks serializing mutations per booking and per ride.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use triply_core::types::{BookingId, RideId};

/// What a mutating operation serializes on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Booking-level operations
    Booking(BookingId),
    /// Booking requests and ride completion
    Ride(RideId),
}

/// One async mutex per key, created on first use
///
/// Entries whose mutex nobody holds or waits on are pruned on the next
/// acquisition, so the map stays proportional to in-flight work.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Copy + Eq + Hash + std::fmt::Debug,
{
    /// Creates an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map holds an unused lock
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        tracing::trace!(?key, "Waiting for lock");
        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no keys are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
