//! Versioned CBOR layout of an exported session cache.

use crate::error::Error;
use crate::record::{Domain, SessionRecord};

use ciborium::Value;
use serde::{Deserialize, Serialize};

/// The only layout this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Deserialize, Serialize)]
pub struct PersistedCache {
    pub version: u32,
    pub capacity: usize,
    /// Least-recently-used vehicle first.
    pub vehicles: Vec<PersistedVehicle>,
}

#[derive(Deserialize, Serialize)]
pub struct PersistedVehicle {
    pub vin: String,
    pub sessions: Vec<PersistedSession>,
}

#[derive(Deserialize, Serialize)]
pub struct PersistedSession {
    pub domain: Domain,
    pub record: SessionRecord,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct RawCache {
    capacity: usize,
    vehicles: Vec<Value>,
}

/// Header fields plus each vehicle entry still in undecoded form, so that a
/// single bad entry can be dropped without losing the rest.
pub struct DecodedCache {
    pub capacity: usize,
    pub vehicles: Vec<Value>,
}

pub fn encode(cache: &PersistedCache) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(cache, &mut bytes).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<DecodedCache, Error> {
    let value: Value =
        ciborium::de::from_reader(bytes).map_err(|e| Error::Decode(e.to_string()))?;

    let header: Header = value
        .deserialized()
        .map_err(|e| Error::Decode(format!("missing header: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(header.version));
    }

    let raw: RawCache = value
        .deserialized()
        .map_err(|e| Error::Decode(e.to_string()))?;

    Ok(DecodedCache {
        capacity: raw.capacity,
        vehicles: raw.vehicles,
    })
}
