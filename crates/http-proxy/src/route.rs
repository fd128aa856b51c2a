//! Recognition of the local command route.

use crate::error::ApiError;

/// Length of a vehicle identification number.
pub const VIN_LENGTH: usize = 17;

const VEHICLES_PREFIX: &str = "/api/1/vehicles/";

/// `/api/1/vehicles/{vin}/command/{command}`, split into its parts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandRoute<'a> {
    /// The vehicle segment, not yet validated.
    pub vin: &'a str,

    /// The command name.
    pub command: &'a str,
}

impl<'a> CommandRoute<'a> {
    /// Matches `path` against the command route. Anything else is relayed.
    #[must_use]
    pub fn parse(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix(VEHICLES_PREFIX)?;
        let mut segments = rest.split('/');

        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(vin), Some("command"), Some(command), None) => Some(Self { vin, command }),
            _ => None,
        }
    }

    /// Rejects vehicle segments that cannot be a VIN, such as Fleet API ids.
    pub const fn validate(&self) -> Result<(), ApiError> {
        if self.vin.len() == VIN_LENGTH {
            Ok(())
        } else {
            Err(ApiError::InvalidVin)
        }
    }
}
