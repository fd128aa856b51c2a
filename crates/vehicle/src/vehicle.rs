use crate::command::Command;
use crate::error::VehicleError;

use async_trait::async_trait;
use vcmd_session_cache::{Domain, SessionCache};

/// A connection to one vehicle able to carry authenticated commands.
///
/// Callers bound every call with their own deadline; dropping a pending call
/// aborts it. A caller holding a `Vehicle` is the only one talking to that
/// vehicle, so implementations need no internal locking.
#[async_trait]
pub trait Vehicle: Send + Sync {
    /// The VIN this facade talks to.
    fn vin(&self) -> &str;

    /// Opens the transport.
    async fn connect(&mut self) -> Result<(), VehicleError>;

    /// Resumes a cached session, or performs a fresh handshake when none is
    /// cached or the vehicle rejects the cached one.
    ///
    /// `domain` limits the handshake to one domain; `None` starts every
    /// domain.
    async fn start_session(&mut self, domain: Option<Domain>) -> Result<(), VehicleError>;

    /// Encodes, authenticates, sends and decodes one command.
    ///
    /// A refusal by the vehicle comes back as [`VehicleError::Nominal`].
    async fn execute(&mut self, command: &Command) -> Result<(), VehicleError>;

    /// Writes the current session state back into `cache`.
    fn update_cached_sessions(&self, cache: &SessionCache);

    /// Releases transport resources. Safe to call more than once.
    async fn disconnect(&mut self);
}
