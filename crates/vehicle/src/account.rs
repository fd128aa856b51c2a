use crate::error::VehicleError;
use crate::vehicle::Vehicle;

use std::sync::Arc;

use async_trait::async_trait;
use vcmd_session_cache::SessionCache;

/// A fleet account, resolved from a bearer token.
#[async_trait]
pub trait Account: Send + Sync + 'static {
    /// Host of the cloud REST API serving this account.
    fn relay_host(&self) -> &str;

    /// Builds a facade for `vin` that resumes sessions from `sessions`.
    async fn vehicle(
        &self,
        vin: &str,
        sessions: Arc<SessionCache>,
    ) -> Result<Box<dyn Vehicle>, VehicleError>;
}

/// Turns bearer tokens into accounts.
#[async_trait]
pub trait AccountResolver: Send + Sync + 'static {
    /// The account type produced.
    type Account: Account;

    /// Resolves `token`, failing with [`VehicleError::Auth`] if it is not
    /// accepted.
    async fn resolve(&self, token: &str) -> Result<Self::Account, VehicleError>;
}
