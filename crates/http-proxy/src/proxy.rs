//! Dispatch of inbound requests to vehicles or to the cloud relay.

use crate::config::{LockWaitBudget, ProxyConfig};
use crate::error::{ApiError, Error};
use crate::relay::CloudRelay;
use crate::request::Request;
use crate::response::CommandResponse;
use crate::route::CommandRoute;

use std::future::Future;
use std::sync::Arc;

use axum::response::{IntoResponse, Response as AxumResponse};
use bytes::Bytes;
use dashmap::DashSet;
use http::Method;
use http::header::AUTHORIZATION;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info, info_span, warn};
use vcmd_locks::LockManager;
use vcmd_locks_memory::MemoryLockManager;
use vcmd_session_cache::SessionCache;
use vcmd_vehicle::{
    Account, AccountResolver, Command, CommandAction, Params, Vehicle, VehicleError,
};

/// How a locally handled command ended, short of a hard failure.
enum Completion {
    Executed,
    Rejected(String),
    UseRestApi,
    Unsupported,
}

/// The command dispatch proxy.
///
/// Commands for one VIN are serialized through a keyed lock; commands for
/// different VINs run in parallel. Vehicles found not to speak the local
/// protocol are relayed to the cloud for the rest of the process lifetime.
pub struct Proxy<R>
where
    R: AccountResolver,
{
    config: ProxyConfig,
    locks: MemoryLockManager,
    relay: CloudRelay,
    resolver: R,
    sessions: Arc<SessionCache>,
    unsupported: DashSet<String>,
}

impl<R> Proxy<R>
where
    R: AccountResolver,
{
    /// Creates a proxy resuming vehicle sessions from `sessions`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the cloud relay client cannot be built.
    pub fn new(
        resolver: R,
        sessions: Arc<SessionCache>,
        config: ProxyConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            relay: CloudRelay::new(config.relay_scheme.clone())?,
            config,
            locks: MemoryLockManager::new(),
            resolver,
            sessions,
            unsupported: DashSet::new(),
        })
    }

    /// The settings this proxy runs with.
    #[must_use]
    pub const fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The shared session cache.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// The per-VIN serialization locks.
    #[must_use]
    pub const fn locks(&self) -> &MemoryLockManager {
        &self.locks
    }

    /// Whether `vin` has been found not to support the local protocol.
    #[must_use]
    pub fn is_unsupported(&self, vin: &str) -> bool {
        self.unsupported.contains(vin)
    }

    /// Handles one request and renders the outcome.
    pub async fn handle(&self, request: Request) -> AxumResponse {
        let span = info_span!(
            "request",
            id = %request.id,
            method = %request.method,
            path = %request.uri.path(),
        );

        self.dispatch(request)
            .instrument(span)
            .await
            .unwrap_or_else(IntoResponse::into_response)
    }

    async fn dispatch(&self, request: Request) -> Result<AxumResponse, ApiError> {
        info!("received request");
        let deadline = Instant::now() + self.config.timeout;

        let account = self.authenticate(&request, deadline).await?;

        let Some(route) = CommandRoute::parse(request.uri.path()) else {
            return self.forward(&account, &request, deadline).await;
        };
        route.validate()?;

        if self.is_unsupported(route.vin) {
            debug!(vin = route.vin, "vehicle is relay-only");
            return self.forward(&account, &request, deadline).await;
        }

        if request.method != Method::POST {
            return Err(ApiError::MethodNotAllowed);
        }

        let params = self.parse_params(&request.body)?;
        let command = match Command::lookup(route.command, &params)? {
            CommandAction::Local(command) => command,
            CommandAction::Relay => return self.forward(&account, &request, deadline).await,
        };

        self.execute(&account, &request, route.vin, &command, deadline)
            .await
    }

    async fn authenticate(
        &self,
        request: &Request,
        deadline: Instant,
    ) -> Result<R::Account, ApiError> {
        let token = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Forbidden("client did not provide an OAuth token".to_string())
            })?;

        bounded(deadline, self.resolver.resolve(token))
            .await
            .map_err(|e| ApiError::Forbidden(e.to_string()))
    }

    fn parse_params(&self, body: &Bytes) -> Result<Params, ApiError> {
        if body.len() > self.config.max_body_bytes {
            return Err(ApiError::BadRequest(format!(
                "request body exceeds {} bytes",
                self.config.max_body_bytes
            )));
        }

        if body.is_empty() {
            return Ok(Params::new());
        }

        serde_json::from_slice(body).map_err(|_| {
            ApiError::BadRequest(
                "invalid JSON: error occurred while parsing request parameters".to_string(),
            )
        })
    }

    async fn execute(
        &self,
        account: &R::Account,
        request: &Request,
        vin: &str,
        command: &Command,
        deadline: Instant,
    ) -> Result<AxumResponse, ApiError> {
        let guard = self.locks.acquire(vin, deadline).await.map_err(|_| {
            warn!(vin, "gave up waiting for vehicle");
            ApiError::LockTimeout
        })?;

        let deadline = match self.config.lock_wait_budget {
            LockWaitBudget::Shared => deadline,
            LockWaitBudget::Additional => Instant::now() + self.config.timeout,
        };

        info!(vin, command = command.name(), "executing command");

        let mut car = match bounded(deadline, account.vehicle(vin, self.sessions.clone())).await {
            Ok(car) => car,
            Err(e) => {
                drop(guard);
                return Err(e.into());
            }
        };

        let completion = drive(car.as_mut(), command, deadline).await;

        car.update_cached_sessions(&self.sessions);
        car.disconnect().await;

        if matches!(completion, Ok(Completion::Unsupported)) {
            info!(
                vin,
                "vehicle does not support the local protocol, relaying from now on"
            );
            self.unsupported.insert(vin.to_string());
        }
        drop(guard);

        match completion {
            Ok(Completion::Executed) => Ok(CommandResponse::executed().into_response()),
            Ok(Completion::Rejected(reason)) => {
                info!(vin, %reason, "vehicle refused command");
                Ok(CommandResponse::rejected(reason).into_response())
            }
            Ok(Completion::UseRestApi | Completion::Unsupported) => {
                self.forward(account, request, deadline).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn forward(
        &self,
        account: &R::Account,
        request: &Request,
        deadline: Instant,
    ) -> Result<AxumResponse, ApiError> {
        self.relay
            .forward(account.relay_host(), request, deadline)
            .await
            .map(IntoResponse::into_response)
    }
}

/// Connects, starts a session for the command's domain and executes it.
async fn drive(
    car: &mut dyn Vehicle,
    command: &Command,
    deadline: Instant,
) -> Result<Completion, VehicleError> {
    bounded(deadline, car.connect()).await?;

    match bounded(deadline, car.start_session(Some(command.domain()))).await {
        Err(VehicleError::ProtocolNotSupported) => return Ok(Completion::Unsupported),
        result => result?,
    }

    match bounded(deadline, car.execute(command)).await {
        Ok(()) => Ok(Completion::Executed),
        Err(VehicleError::Nominal(reason)) => Ok(Completion::Rejected(reason)),
        Err(VehicleError::UseRestApi) => Ok(Completion::UseRestApi),
        Err(e) => Err(e),
    }
}

async fn bounded<T, F>(deadline: Instant, future: F) -> Result<T, VehicleError>
where
    F: Future<Output = Result<T, VehicleError>>,
{
    timeout_at(deadline, future)
        .await
        .unwrap_or(Err(VehicleError::Timeout))
}
