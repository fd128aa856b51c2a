//! Bounded, persistable store of per-vehicle cryptographic session state.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod persist;
mod record;

pub use error::Error;
pub use persist::FORMAT_VERSION;
pub use record::{Domain, SessionRecord};

use persist::{PersistedCache, PersistedSession, PersistedVehicle};

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, warn};

type VehicleSessions = HashMap<Domain, SessionRecord>;

/// Session records keyed by VIN, bounded by the number of distinct vehicles.
///
/// When a new vehicle would exceed the capacity, every record of the
/// least-recently-used vehicle is evicted together. The cache is shared by
/// reference between concurrent command executions; each operation holds the
/// internal mutex only for the duration of a map update.
#[derive(Debug)]
pub struct SessionCache {
    capacity: NonZeroUsize,
    vehicles: Mutex<LruCache<String, VehicleSessions>>,
}

impl SessionCache {
    /// Creates an empty cache tracking at most `capacity` vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::InvalidCapacity)?;

        Ok(Self {
            capacity,
            vehicles: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Maximum number of vehicles held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of vehicles currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.lock().len()
    }

    /// Whether the cache holds no vehicles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.lock().is_empty()
    }

    /// Whether any record is held for `vin`. Does not affect recency.
    #[must_use]
    pub fn contains_vehicle(&self, vin: &str) -> bool {
        self.vehicles.lock().contains(vin)
    }

    /// VINs currently held, most-recently-used first. Does not affect recency.
    #[must_use]
    pub fn vehicle_ids(&self) -> Vec<String> {
        self.vehicles
            .lock()
            .iter()
            .map(|(vin, _)| vin.clone())
            .collect()
    }

    /// Looks up the record for one domain of a vehicle and marks the vehicle
    /// as most recently used.
    #[must_use]
    pub fn get(&self, vin: &str, domain: Domain) -> Option<SessionRecord> {
        self.vehicles
            .lock()
            .get(vin)
            .and_then(|sessions| sessions.get(&domain))
            .cloned()
    }

    /// Inserts or replaces the record for one domain of a vehicle.
    ///
    /// A record for the session already stored (same epoch and secret) is
    /// merged so its counter never moves backwards. Adding a new vehicle at
    /// capacity evicts the least-recently-used other vehicle first.
    pub fn put(&self, vin: impl Into<String>, domain: Domain, record: SessionRecord) {
        let vin = vin.into();
        let mut vehicles = self.vehicles.lock();

        if let Some(sessions) = vehicles.get_mut(&vin) {
            match sessions.get_mut(&domain) {
                Some(existing) if existing.same_session(&record) => existing.merge(record),
                _ => {
                    sessions.insert(domain, record);
                }
            }
            return;
        }

        let mut sessions = VehicleSessions::new();
        sessions.insert(domain, record);

        if let Some((evicted, _)) = vehicles.push(vin, sessions) {
            debug!(vin = %evicted, "evicted vehicle sessions from cache");
        }
    }

    /// Drops the record for one domain of a vehicle. Absent entries are
    /// ignored.
    pub fn remove(&self, vin: &str, domain: Domain) {
        let mut vehicles = self.vehicles.lock();

        let now_empty = vehicles.peek_mut(vin).is_some_and(|sessions| {
            sessions.remove(&domain);
            sessions.is_empty()
        });

        if now_empty {
            vehicles.pop(vin);
        }
    }

    /// Drops every record of a vehicle. Absent entries are ignored.
    pub fn remove_all(&self, vin: &str) {
        self.vehicles.lock().pop(vin);
    }

    /// Serializes every retained record into the versioned byte format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if serialization fails.
    pub fn export_to_bytes(&self) -> Result<Bytes, Error> {
        let vehicles = {
            let vehicles = self.vehicles.lock();

            vehicles
                .iter()
                .rev()
                .map(|(vin, sessions)| {
                    let mut sessions = sessions
                        .iter()
                        .map(|(domain, record)| PersistedSession {
                            domain: *domain,
                            record: record.clone(),
                        })
                        .collect::<Vec<_>>();
                    sessions.sort_by_key(|session| session.domain);

                    PersistedVehicle {
                        vin: vin.clone(),
                        sessions,
                    }
                })
                .collect()
        };

        let bytes = persist::encode(&PersistedCache {
            version: FORMAT_VERSION,
            capacity: self.capacity.get(),
            vehicles,
        })?;

        Ok(Bytes::from(bytes))
    }

    /// Rebuilds a cache holding at most `capacity` vehicles from
    /// [`Self::export_to_bytes`] output.
    ///
    /// The capacity recorded in the stream is ignored. Vehicle entries that
    /// fail to decode are skipped; the rest load in their original recency
    /// order, so a smaller `capacity` keeps the most recently used vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero,
    /// [`Error::UnsupportedVersion`] for an unknown format version and
    /// [`Error::Decode`] for a truncated or corrupt stream.
    pub fn import_from_bytes(bytes: &[u8], capacity: usize) -> Result<Self, Error> {
        let cache = Self::new(capacity)?;
        let decoded = persist::decode(bytes)?;

        let mut skipped = 0usize;
        for entry in decoded.vehicles {
            match entry.deserialized::<PersistedVehicle>() {
                Ok(vehicle) => {
                    for session in vehicle.sessions {
                        cache.put(vehicle.vin.clone(), session.domain, session.record);
                    }
                }
                Err(e) => {
                    skipped += 1;
                    warn!("skipping unreadable session cache entry: {}", e);
                }
            }
        }

        debug!(
            vehicles = cache.len(),
            saved_capacity = decoded.capacity,
            skipped,
            "imported session cache"
        );

        Ok(cache)
    }

    /// Writes [`Self::export_to_bytes`] output to `path`, replacing it
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] or [`Error::Io`].
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let bytes = self.export_to_bytes()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::Io("error writing session cache", e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::Io("error replacing session cache", e))?;

        Ok(())
    }

    /// Reads a cache previously written by [`Self::export_to_file`] into a
    /// cache holding at most `capacity` vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise the errors
    /// of [`Self::import_from_bytes`].
    pub async fn import_from_file(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<Self, Error> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| Error::Io("error reading session cache", e))?;

        Self::import_from_bytes(&bytes, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use ciborium::Value;
    use tempfile::tempdir;

    fn record(seed: u8, counter: u32) -> SessionRecord {
        SessionRecord::new(
            vec![seed; 32],
            vec![seed.wrapping_add(1); 16],
            counter,
            Utc::now() + Duration::hours(1),
        )
    }

    fn vin(n: usize) -> String {
        format!("5YJ3E1EA7PF{n:06}")
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_matches!(SessionCache::new(0), Err(Error::InvalidCapacity));
    }

    #[test]
    fn test_put_and_get() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 5));

        let found = cache.get(&vin(1), Domain::VehicleSecurity).unwrap();
        assert_eq!(found.counter(), 5);

        assert!(cache.get(&vin(1), Domain::Infotainment).is_none());
        assert!(cache.get(&vin(2), Domain::VehicleSecurity).is_none());
    }

    #[test]
    fn test_capacity_counts_vehicles_not_domains() {
        let cache = SessionCache::new(1).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(1), Domain::Infotainment, record(2, 1));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&vin(1), Domain::VehicleSecurity).is_some());
        assert!(cache.get(&vin(1), Domain::Infotainment).is_some());
    }

    #[test]
    fn test_eviction_drops_whole_vehicle() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(1), Domain::Infotainment, record(2, 1));
        cache.put(vin(2), Domain::VehicleSecurity, record(3, 1));
        cache.put(vin(3), Domain::VehicleSecurity, record(4, 1));

        assert!(!cache.contains_vehicle(&vin(1)));
        assert!(cache.get(&vin(1), Domain::Infotainment).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(2), Domain::VehicleSecurity, record(2, 1));

        let _ = cache.get(&vin(1), Domain::VehicleSecurity);
        cache.put(vin(3), Domain::VehicleSecurity, record(3, 1));

        assert!(cache.contains_vehicle(&vin(1)));
        assert!(!cache.contains_vehicle(&vin(2)));
        assert!(cache.contains_vehicle(&vin(3)));
    }

    #[test]
    fn test_holds_most_recently_accessed_vehicles() {
        for capacity in 1..=5 {
            let cache = SessionCache::new(capacity).unwrap();
            let mut order: Vec<String> = Vec::new();

            // Deterministic access pattern that revisits earlier vehicles.
            for step in 0..40usize {
                let id = vin((step * 7 + step / 3) % 11);
                cache.put(id.clone(), Domain::VehicleSecurity, record(1, 1));
                order.retain(|v| v != &id);
                order.insert(0, id);
            }

            let expected: Vec<String> = order.into_iter().take(capacity).collect();
            assert_eq!(cache.vehicle_ids(), expected, "capacity {capacity}");
        }
    }

    #[test]
    fn test_put_never_regresses_counter() {
        let cache = SessionCache::new(1).unwrap();
        cache.put(vin(1), Domain::Infotainment, record(9, 40));
        cache.put(vin(1), Domain::Infotainment, record(9, 12));

        assert_eq!(
            cache.get(&vin(1), Domain::Infotainment).unwrap().counter(),
            40
        );
    }

    #[test]
    fn test_new_epoch_replaces_record() {
        let cache = SessionCache::new(1).unwrap();
        cache.put(vin(1), Domain::Infotainment, record(9, 40));
        cache.put(vin(1), Domain::Infotainment, record(10, 1));

        let found = cache.get(&vin(1), Domain::Infotainment).unwrap();
        assert_eq!(found.counter(), 1);
        assert_eq!(found.epoch().as_ref(), &[11u8; 16]);
    }

    #[test]
    fn test_remove() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(1), Domain::Infotainment, record(2, 1));

        cache.remove(&vin(1), Domain::VehicleSecurity);
        assert!(cache.get(&vin(1), Domain::VehicleSecurity).is_none());
        assert!(cache.contains_vehicle(&vin(1)));

        cache.remove(&vin(1), Domain::Infotainment);
        assert!(!cache.contains_vehicle(&vin(1)));

        // Absent entries are fine.
        cache.remove(&vin(7), Domain::Infotainment);
        cache.remove_all(&vin(7));
    }

    #[test]
    fn test_remove_all() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(1), Domain::Infotainment, record(2, 1));

        cache.remove_all(&vin(1));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_export_import_preserves_records_and_recency() {
        let cache = SessionCache::new(3).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 11));
        cache.put(vin(2), Domain::Infotainment, record(2, 22));
        cache.put(vin(2), Domain::VehicleSecurity, record(3, 33));
        cache.put(vin(3), Domain::Infotainment, record(4, 44));
        let _ = cache.get(&vin(1), Domain::VehicleSecurity);

        let bytes = cache.export_to_bytes().unwrap();
        let restored = SessionCache::import_from_bytes(&bytes, 3).unwrap();

        assert_eq!(restored.capacity(), 3);
        assert_eq!(restored.vehicle_ids(), cache.vehicle_ids());

        for id in cache.vehicle_ids() {
            for domain in Domain::ALL {
                assert_eq!(restored.get(&id, domain), cache.get(&id, domain));
            }
        }
    }

    #[test]
    fn test_import_rejects_unknown_version() {
        let mut bytes = Vec::new();
        let value = Value::Map(vec![
            (Value::Text("version".into()), Value::Integer(99.into())),
            (Value::Text("capacity".into()), Value::Integer(1.into())),
            (Value::Text("vehicles".into()), Value::Array(vec![])),
        ]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();

        assert_matches!(
            SessionCache::import_from_bytes(&bytes, 1),
            Err(Error::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_import_rejects_truncated_stream() {
        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        let bytes = cache.export_to_bytes().unwrap();

        assert_matches!(
            SessionCache::import_from_bytes(&bytes[..bytes.len() / 2], 2),
            Err(Error::Decode(_))
        );
        assert_matches!(
            SessionCache::import_from_bytes(b"not cbor at all", 2),
            Err(Error::Decode(_))
        );
    }

    #[test]
    fn test_import_ignores_saved_capacity() {
        let mut bytes = Vec::new();
        let value = Value::Map(vec![
            (
                Value::Text("version".into()),
                Value::Integer(FORMAT_VERSION.into()),
            ),
            (
                Value::Text("capacity".into()),
                Value::Integer((u64::MAX / 2).into()),
            ),
            (Value::Text("vehicles".into()), Value::Array(vec![])),
        ]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();

        let restored = SessionCache::import_from_bytes(&bytes, 4).unwrap();
        assert_eq!(restored.capacity(), 4);
        assert!(restored.is_empty());

        assert_matches!(
            SessionCache::import_from_bytes(&bytes, 0),
            Err(Error::InvalidCapacity)
        );
    }

    #[test]
    fn test_import_into_smaller_cache_keeps_most_recent() {
        let cache = SessionCache::new(3).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 1));
        cache.put(vin(2), Domain::VehicleSecurity, record(2, 2));
        cache.put(vin(3), Domain::VehicleSecurity, record(3, 3));
        let _ = cache.get(&vin(1), Domain::VehicleSecurity);

        let bytes = cache.export_to_bytes().unwrap();
        let restored = SessionCache::import_from_bytes(&bytes, 2).unwrap();

        assert_eq!(restored.capacity(), 2);
        assert_eq!(restored.vehicle_ids(), vec![vin(1), vin(3)]);
    }

    #[test]
    fn test_import_skips_bad_entries() {
        let good = Value::serialized(&PersistedVehicle {
            vin: vin(1),
            sessions: vec![PersistedSession {
                domain: Domain::Infotainment,
                record: record(5, 8),
            }],
        })
        .unwrap();
        let bad = Value::Map(vec![(
            Value::Text("vin".into()),
            Value::Integer(12.into()),
        )]);

        let mut bytes = Vec::new();
        let value = Value::Map(vec![
            (
                Value::Text("version".into()),
                Value::Integer(FORMAT_VERSION.into()),
            ),
            (Value::Text("capacity".into()), Value::Integer(4.into())),
            (Value::Text("vehicles".into()), Value::Array(vec![bad, good])),
        ]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();

        let restored = SessionCache::import_from_bytes(&bytes, 4).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(
            restored.get(&vin(1), Domain::Infotainment).unwrap().counter(),
            8
        );
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.cbor");

        let cache = SessionCache::new(2).unwrap();
        cache.put(vin(1), Domain::VehicleSecurity, record(1, 3));
        cache.export_to_file(&path).await.unwrap();

        let restored = SessionCache::import_from_file(&path, 2).await.unwrap();
        assert_eq!(
            restored.get(&vin(1), Domain::VehicleSecurity),
            cache.get(&vin(1), Domain::VehicleSecurity)
        );
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let dir = tempdir().unwrap();

        assert_matches!(
            SessionCache::import_from_file(dir.path().join("missing"), 2).await,
            Err(Error::Io(_, _))
        );
    }
}
