use crate::behavior::Outcome;
use crate::{Event, MockFleet};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;
use vcmd_session_cache::{Domain, SessionCache, SessionRecord};
use vcmd_vehicle::{Command, Vehicle, VehicleError};

/// How long a freshly negotiated session stays valid.
const SESSION_LIFETIME_MINUTES: i64 = 60;

/// Facade over a simulated vehicle.
pub struct MockVehicle {
    active: HashMap<Domain, SessionRecord>,
    connected: bool,
    fleet: MockFleet,
    sessions: Arc<SessionCache>,
    vin: String,
}

impl MockVehicle {
    pub(crate) fn new(fleet: MockFleet, vin: String, sessions: Arc<SessionCache>) -> Self {
        Self {
            active: HashMap::new(),
            connected: false,
            fleet,
            sessions,
            vin,
        }
    }

    fn resume(&self, domain: Domain) -> Option<SessionRecord> {
        let cached = self.sessions.get(&self.vin, domain)?;

        let accepted = !cached.is_expired(Utc::now())
            && self
                .fleet
                .with_car(&self.vin, |car| car.accepts(domain, &cached));

        if accepted {
            Some(cached)
        } else {
            debug!(vin = %self.vin, %domain, "discarding stale cached session");
            self.sessions.remove(&self.vin, domain);
            None
        }
    }
}

#[async_trait]
impl Vehicle for MockVehicle {
    fn vin(&self) -> &str {
        &self.vin
    }

    async fn connect(&mut self) -> Result<(), VehicleError> {
        self.fleet.record(&self.vin, Event::Connect);

        if let Some(message) = self
            .fleet
            .with_car(&self.vin, |car| car.behavior.connect_failure.clone())
        {
            return Err(VehicleError::Transport(message));
        }

        self.connected = true;
        Ok(())
    }

    async fn start_session(&mut self, domain: Option<Domain>) -> Result<(), VehicleError> {
        if !self.connected {
            return Err(VehicleError::Transport("not connected".to_string()));
        }
        if !self
            .fleet
            .with_car(&self.vin, |car| car.behavior.supports_protocol)
        {
            return Err(VehicleError::ProtocolNotSupported);
        }

        let domains = domain.map_or_else(|| Domain::ALL.to_vec(), |domain| vec![domain]);

        for domain in domains {
            if let Some(record) = self.resume(domain) {
                self.fleet.record(&self.vin, Event::SessionResumed(domain));
                self.active.insert(domain, record);
                continue;
            }

            let (secret, epoch) = self.fleet.with_car(&self.vin, |car| car.handshake(domain));
            let record = SessionRecord::new(
                secret,
                epoch,
                0,
                Utc::now() + Duration::minutes(SESSION_LIFETIME_MINUTES),
            );

            self.fleet.record(&self.vin, Event::Handshake(domain));
            self.active.insert(domain, record);
        }

        Ok(())
    }

    async fn execute(&mut self, command: &Command) -> Result<(), VehicleError> {
        let domain = command.domain();
        let (outcome, delay) = self.fleet.with_car(&self.vin, |car| {
            (
                car.behavior.outcome(command.name()),
                car.behavior.execute_delay,
            )
        });

        if outcome == Outcome::UseRestApi {
            return Err(VehicleError::UseRestApi);
        }

        let Some(record) = self.active.get_mut(&domain) else {
            return Err(VehicleError::Protocol(format!("no session for {domain}")));
        };

        self.fleet
            .record(&self.vin, Event::ExecuteStart(command.name().to_string()));

        let mut outgoing = record.clone();
        outgoing
            .advance(record.counter().saturating_add(1))
            .map_err(|e| VehicleError::Protocol(e.to_string()))?;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let authenticated = self
            .fleet
            .with_car(&self.vin, |car| car.authenticate(domain, &outgoing));

        if let Err(e) = authenticated {
            if e == VehicleError::SessionRejected {
                self.active.remove(&domain);
                self.sessions.remove(&self.vin, domain);
            }
            return Err(e);
        }

        // The counter was spent whatever the vehicle answers.
        *record = outgoing;

        self.fleet
            .record(&self.vin, Event::ExecuteEnd(command.name().to_string()));

        match outcome {
            Outcome::Success => Ok(()),
            Outcome::Reject(reason) => Err(VehicleError::Nominal(reason)),
            Outcome::Fault(message) => Err(VehicleError::Protocol(message)),
            Outcome::UseRestApi => Err(VehicleError::UseRestApi),
        }
    }

    fn update_cached_sessions(&self, cache: &SessionCache) {
        for (domain, record) in &self.active {
            cache.put(self.vin.clone(), *domain, record.clone());
        }
        self.fleet.record(&self.vin, Event::CacheFlush);
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.fleet.record(&self.vin, Event::Disconnect);
    }
}
