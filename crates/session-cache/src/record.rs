use crate::error::Error;

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical vehicle sub-system with its own independent session state.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Domain {
    /// The access-control controller (locks, closures, key management).
    VehicleSecurity,

    /// The infotainment system (climate, charging, media, driving settings).
    Infotainment,
}

impl Domain {
    /// All domains, in a stable order.
    pub const ALL: [Self; 2] = [Self::VehicleSecurity, Self::Infotainment];
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VehicleSecurity => write!(f, "vehicle-security"),
            Self::Infotainment => write!(f, "infotainment"),
        }
    }
}

/// Negotiated session state for one domain of one vehicle.
///
/// The shared secret is fixed at construction. A vehicle that reports a new
/// epoch needs a brand-new record; there is no way to swap the secret of an
/// existing one.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionRecord {
    shared_secret: Bytes,
    counter: u32,
    epoch: Bytes,
    expires_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a record for a freshly negotiated session.
    #[must_use]
    pub fn new(
        shared_secret: impl Into<Bytes>,
        epoch: impl Into<Bytes>,
        counter: u32,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            counter,
            epoch: epoch.into(),
            expires_at,
            last_used: Utc::now(),
        }
    }

    /// The negotiated secret material.
    #[must_use]
    pub const fn shared_secret(&self) -> &Bytes {
        &self.shared_secret
    }

    /// The anti-replay counter of the last authenticated message.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// The generation marker the vehicle assigned when the session started.
    #[must_use]
    pub const fn epoch(&self) -> &Bytes {
        &self.epoch
    }

    /// When the vehicle stops honouring this session.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// When the session last carried a command.
    #[must_use]
    pub const fn last_used(&self) -> DateTime<Utc> {
        self.last_used
    }

    /// Whether the session is stale at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `other` belongs to the same negotiated session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        self.epoch == other.epoch && self.shared_secret == other.shared_secret
    }

    /// Moves the counter forward after a command and refreshes `last_used`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CounterRegression`] if `counter` is lower than the
    /// current value.
    pub fn advance(&mut self, counter: u32) -> Result<(), Error> {
        if counter < self.counter {
            return Err(Error::CounterRegression {
                current: self.counter,
                requested: counter,
            });
        }

        self.counter = counter;
        self.last_used = Utc::now();

        Ok(())
    }

    /// Folds a newer copy of the same session into this one. Counters and
    /// timestamps only move forward.
    pub(crate) fn merge(&mut self, newer: Self) {
        self.counter = self.counter.max(newer.counter);
        self.expires_at = self.expires_at.max(newer.expires_at);
        self.last_used = self.last_used.max(newer.last_used);
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("shared_secret", &"<redacted>")
            .field("counter", &self.counter)
            .field("epoch", &self.epoch)
            .field("expires_at", &self.expires_at)
            .field("last_used", &self.last_used)
            .finish()
    }
}
