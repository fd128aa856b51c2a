use thiserror::Error;
use vcmd_locks::LockManagerError;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The deadline passed before the lock was handed over.
    #[error("timed out waiting for lock")]
    Timeout,
}

impl LockManagerError for Error {}
