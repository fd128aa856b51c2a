//! Simulated fleet implementing the vehicle and account contracts, for tests
//! and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod behavior;
mod car;
mod vehicle;

pub use behavior::{MockVehicleBehavior, Outcome};
pub use vehicle::MockVehicle;

use car::SimulatedCar;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use vcmd_session_cache::{Domain, SessionCache};
use vcmd_vehicle::{Account, AccountResolver, Vehicle, VehicleError};

/// Something a simulated vehicle observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// Session state was written back to the cache.
    CacheFlush,
    /// The transport was opened (or an attempt was made).
    Connect,
    /// The transport was closed.
    Disconnect,
    /// A command reply was produced.
    ExecuteEnd(String),
    /// A command was sent.
    ExecuteStart(String),
    /// A fresh session was negotiated.
    Handshake(Domain),
    /// A cached session was accepted.
    SessionResumed(Domain),
}

/// One journal line.
#[derive(Clone, Debug)]
pub struct JournalEntry {
    /// When it happened.
    pub at: Instant,
    /// What happened.
    pub event: Event,
    /// Which vehicle.
    pub vin: String,
}

#[derive(Debug)]
struct FleetInner {
    accepted_tokens: Mutex<HashSet<String>>,
    cars: Mutex<HashMap<String, SimulatedCar>>,
    journal: Mutex<Vec<JournalEntry>>,
    relay_host: String,
}

/// A simulated fleet of vehicles behind a simulated account service.
///
/// Unknown VINs behave as [`MockVehicleBehavior::default`]. Any non-empty
/// token is accepted unless tokens are restricted with
/// [`MockFleet::require_token`].
#[derive(Clone, Debug)]
pub struct MockFleet {
    inner: Arc<FleetInner>,
}

impl MockFleet {
    /// Creates a fleet whose accounts relay to `relay_host`.
    #[must_use]
    pub fn new(relay_host: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(FleetInner {
                accepted_tokens: Mutex::new(HashSet::new()),
                cars: Mutex::new(HashMap::new()),
                journal: Mutex::new(Vec::new()),
                relay_host: relay_host.into(),
            }),
        }
    }

    /// Restricts accepted tokens to those registered here.
    #[must_use]
    pub fn require_token(self, token: impl Into<String>) -> Self {
        self.inner.accepted_tokens.lock().insert(token.into());
        self
    }

    /// Sets how `vin` behaves from now on. Session state is kept.
    pub fn set_behavior(&self, vin: &str, behavior: MockVehicleBehavior) {
        self.with_car(vin, |car| car.behavior = behavior);
    }

    /// Simulates a vehicle reset: new epoch, every session forgotten.
    pub fn reset_vehicle(&self, vin: &str) {
        self.with_car(vin, SimulatedCar::reset);
    }

    /// The epoch `vin` currently reports.
    #[must_use]
    pub fn epoch(&self, vin: &str) -> Bytes {
        self.with_car(vin, |car| car.epoch().clone())
    }

    /// Last counter `vin` accepted in `domain`.
    #[must_use]
    pub fn last_counter(&self, vin: &str, domain: Domain) -> Option<u32> {
        self.with_car(vin, |car| car.last_counter(domain))
    }

    /// Everything observed so far, in order.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.journal.lock().clone()
    }

    /// Journal lines for one VIN.
    #[must_use]
    pub fn events(&self, vin: &str) -> Vec<Event> {
        self.inner
            .journal
            .lock()
            .iter()
            .filter(|entry| entry.vin == vin)
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub(crate) fn with_car<R>(&self, vin: &str, f: impl FnOnce(&mut SimulatedCar) -> R) -> R {
        let mut cars = self.inner.cars.lock();
        let car = cars
            .entry(vin.to_string())
            .or_insert_with(|| SimulatedCar::new(MockVehicleBehavior::default()));
        f(car)
    }

    pub(crate) fn record(&self, vin: &str, event: Event) {
        self.inner.journal.lock().push(JournalEntry {
            at: Instant::now(),
            event,
            vin: vin.to_string(),
        });
    }
}

/// An account of a [`MockFleet`].
#[derive(Clone, Debug)]
pub struct MockAccount {
    fleet: MockFleet,
}

#[async_trait]
impl Account for MockAccount {
    fn relay_host(&self) -> &str {
        &self.fleet.inner.relay_host
    }

    async fn vehicle(
        &self,
        vin: &str,
        sessions: Arc<SessionCache>,
    ) -> Result<Box<dyn Vehicle>, VehicleError> {
        Ok(Box::new(MockVehicle::new(
            self.fleet.clone(),
            vin.to_string(),
            sessions,
        )))
    }
}

#[async_trait]
impl AccountResolver for MockFleet {
    type Account = MockAccount;

    async fn resolve(&self, token: &str) -> Result<Self::Account, VehicleError> {
        if token.is_empty() {
            return Err(VehicleError::Auth("empty token".to_string()));
        }

        let accepted = self.inner.accepted_tokens.lock();
        if !accepted.is_empty() && !accepted.contains(token) {
            return Err(VehicleError::Auth("token not recognized".to_string()));
        }
        drop(accepted);

        Ok(MockAccount {
            fleet: self.clone(),
        })
    }
}
