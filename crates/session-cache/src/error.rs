use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A counter update would move the anti-replay counter backwards.
    #[error("counter regression: current {current}, requested {requested}")]
    CounterRegression {
        /// The counter currently held by the record.
        current: u32,

        /// The counter that was rejected.
        requested: u32,
    },

    /// The persisted stream could not be decoded.
    #[error("failed to decode session cache: {0}")]
    Decode(String),

    /// The cache could not be encoded.
    #[error("failed to encode session cache: {0}")]
    Encode(String),

    /// Capacity must be at least one vehicle.
    #[error("session cache capacity must be positive")]
    InvalidCapacity,

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The persisted stream was written by an unknown format version.
    #[error("unsupported session cache version {0}")]
    UnsupportedVersion(u32),
}
