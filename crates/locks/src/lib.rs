//! Abstract interface for serializing work per key.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::time::Instant;

/// Marker trait for `LockManager` errors
pub trait LockManagerError: Debug + Error + Send + Sync + 'static {}

/// Represents the current status of a keyed lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// Nobody holds or waits for the key.
    Free,

    /// The key has a holder, with `queued` callers waiting behind it.
    Held {
        /// Number of callers waiting for the holder to release.
        queued: usize,
    },
}

/// A lock manager handing out exclusive, per-key access.
///
/// Only keys that are currently held or waited on occupy memory. Locks are
/// represented by a guard that releases the key when dropped.
#[async_trait]
pub trait LockManager: Clone + Send + Sync + 'static {
    /// The error type for lock operations.
    type Error: LockManagerError;

    /// The guard type that releases the lock on drop.
    type Guard: Send + Sync + 'static;

    /// Checks the status of a lock.
    ///
    /// # Arguments
    /// * `key`: The unique identifier for the resource.
    fn check(&self, key: &str) -> LockStatus;

    /// Waits until the caller is the sole holder of `key`, or `deadline`
    /// passes.
    ///
    /// A caller that gives up leaves no trace in the lock table.
    ///
    /// # Arguments
    /// * `key`: A unique identifier for the resource to be locked.
    /// * `deadline`: When to stop waiting.
    async fn acquire(&self, key: &str, deadline: Instant) -> Result<Self::Guard, Self::Error>;

    /// Attempts to acquire a lock without waiting.
    ///
    /// If the lock is acquired successfully, returns `Some(Guard)`.
    /// If the lock is currently held by another caller, returns `None`.
    ///
    /// # Arguments
    /// * `key`: A unique identifier for the resource to be locked.
    fn try_lock(&self, key: &str) -> Option<Self::Guard>;

    /// Hands `key` to the next waiter, or frees it if nobody waits.
    ///
    /// # Panics
    ///
    /// Implementations panic if `key` has no holder. Releasing a lock the
    /// caller does not hold is a broken invariant, never a recoverable error.
    fn release(&self, key: &str);
}
