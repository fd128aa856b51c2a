use thiserror::Error;

/// Classified failures crossing the vehicle/account boundary.
///
/// Every failure is classified here, before it reaches the proxy, so that a
/// rejection issued by the vehicle itself ([`VehicleError::Nominal`]) is never
/// confused with a fault in getting the command there.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VehicleError {
    /// The bearer credential was missing or not accepted.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The command parameters were missing or of the wrong type.
    #[error("invalid command parameters: {0}")]
    InvalidParameters(String),

    /// The vehicle authenticated and understood the command but refused it.
    /// Carries the vehicle's stated reason.
    #[error("{0}")]
    Nominal(String),

    /// A reply could not be authenticated or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The vehicle does not implement the local encrypted protocol at all.
    #[error("vehicle does not support the encrypted command protocol")]
    ProtocolNotSupported,

    /// The vehicle no longer recognizes the session (epoch mismatch or
    /// unknown session).
    #[error("vehicle rejected the session")]
    SessionRejected,

    /// A round trip did not finish in time.
    #[error("vehicle did not respond in time")]
    Timeout,

    /// The transport could not be opened or failed mid-exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// The command name is not part of the catalogue.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command has to go through the cloud REST API even though the
    /// session is healthy.
    #[error("command must be sent through the REST API")]
    UseRestApi,
}

impl VehicleError {
    /// Whether this is an authenticated rejection issued by the vehicle.
    #[must_use]
    pub const fn is_nominal(&self) -> bool {
        matches!(self, Self::Nominal(_))
    }
}
