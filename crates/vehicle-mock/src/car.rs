//! The vehicle side of the simulated protocol.

use crate::behavior::MockVehicleBehavior;

use std::collections::HashMap;

use bytes::Bytes;
use rand::RngCore;
use rand::rngs::OsRng;
use vcmd_session_cache::{Domain, SessionRecord};
use vcmd_vehicle::VehicleError;

#[derive(Debug)]
struct DomainSession {
    secret: Bytes,
    last_counter: u32,
}

/// What one simulated vehicle remembers about its sessions.
#[derive(Debug)]
pub struct SimulatedCar {
    pub behavior: MockVehicleBehavior,
    epoch: Bytes,
    sessions: HashMap<Domain, DomainSession>,
}

fn random_bytes(len: usize) -> Bytes {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    Bytes::from(bytes)
}

impl SimulatedCar {
    pub fn new(behavior: MockVehicleBehavior) -> Self {
        Self {
            behavior,
            epoch: random_bytes(16),
            sessions: HashMap::new(),
        }
    }

    pub const fn epoch(&self) -> &Bytes {
        &self.epoch
    }

    /// Forgets every session and starts a new epoch, as a vehicle does after
    /// a reset.
    pub fn reset(&mut self) {
        self.epoch = random_bytes(16);
        self.sessions.clear();
    }

    /// Whether a cached record still matches what the vehicle holds.
    pub fn accepts(&self, domain: Domain, record: &SessionRecord) -> bool {
        record.epoch() == &self.epoch
            && self
                .sessions
                .get(&domain)
                .is_some_and(|session| &session.secret == record.shared_secret())
    }

    /// Negotiates a fresh secret for `domain`.
    pub fn handshake(&mut self, domain: Domain) -> (Bytes, Bytes) {
        let secret = random_bytes(32);
        self.sessions.insert(
            domain,
            DomainSession {
                secret: secret.clone(),
                last_counter: 0,
            },
        );

        (secret, self.epoch.clone())
    }

    /// Checks the anti-replay counter of an incoming command.
    pub fn authenticate(
        &mut self,
        domain: Domain,
        record: &SessionRecord,
    ) -> Result<(), VehicleError> {
        if !self.accepts(domain, record) {
            return Err(VehicleError::SessionRejected);
        }

        let Some(session) = self.sessions.get_mut(&domain) else {
            return Err(VehicleError::SessionRejected);
        };

        if record.counter() <= session.last_counter {
            return Err(VehicleError::Protocol(format!(
                "replayed counter {} (last {})",
                record.counter(),
                session.last_counter
            )));
        }
        session.last_counter = record.counter();

        Ok(())
    }

    pub fn last_counter(&self, domain: Domain) -> Option<u32> {
        self.sessions.get(&domain).map(|session| session.last_counter)
    }
}
