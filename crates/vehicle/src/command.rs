//! Closed catalogue of commands the proxy can deliver over a local session.

use crate::error::VehicleError;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use vcmd_session_cache::Domain;

/// Request parameters, as parsed from the request body.
pub type Params = Map<String, Value>;

/// Which trunk to actuate.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Trunk {
    /// The front trunk. It cannot be closed remotely.
    Front,

    /// The rear trunk.
    Rear,
}

/// What to do with the windows.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    /// Close every window.
    Close,

    /// Crack every window open.
    Vent,
}

/// A command the local encrypted protocol carries.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Open or close a trunk.
    ActuateTrunk(Trunk),
    /// Close the charge port door.
    ChargePortClose,
    /// Open the charge port door.
    ChargePortOpen,
    /// Clear the speed limit PIN.
    ClearSpeedLimitPin {
        /// Current speed limit PIN.
        pin: String,
    },
    /// Flash the headlights.
    FlashLights,
    /// Enable or disable guest mode.
    GuestMode {
        /// Target state.
        enable: bool,
    },
    /// Sound the horn.
    HonkHorn,
    /// Lock the doors.
    Lock,
    /// Clear the PIN to drive. PIN to drive must be disabled first.
    ResetPinToDrive,
    /// Clear the valet mode PIN.
    ResetValetPin,
    /// Enable or disable PIN to drive, optionally setting the PIN.
    SetPinToDrive {
        /// Target state.
        on: bool,
        /// PIN to set.
        password: Option<String>,
    },
    /// Enable or disable sentry mode.
    SentryMode {
        /// Target state.
        on: bool,
    },
    /// Enable or disable valet mode.
    ValetMode {
        /// Target state.
        on: bool,
        /// Valet PIN.
        password: Option<String>,
    },
    /// Activate the speed limit.
    SpeedLimitActivate {
        /// Speed limit PIN.
        pin: String,
    },
    /// Deactivate the speed limit.
    SpeedLimitDeactivate {
        /// Speed limit PIN.
        pin: String,
    },
    /// Set the speed limit.
    SpeedLimitSetLimit {
        /// Limit in miles per hour.
        limit_mph: f64,
    },
    /// Move the sunroof to an absolute opening level.
    SunroofLevel(u8),
    /// Trigger the garage door opener at a location.
    TriggerHomelink {
        /// Latitude of the vehicle.
        lat: f32,
        /// Longitude of the vehicle.
        lon: f32,
    },
    /// Unlock the doors.
    Unlock,
    /// Close or vent the windows.
    Window(WindowAction),
}

/// Outcome of looking up a command name.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandAction {
    /// Deliver over a local session.
    Local(Command),

    /// Known command that only the cloud REST API carries.
    Relay,
}

/// Command names that exist only on the cloud REST API.
const RELAY_ONLY: &[&str] = &[
    "navigation_request",
    "set_managed_charge_current_request",
    "wake_up",
];

/// Names accepted by [`Command::lookup`], not counting relay-only names.
pub const COMMAND_NAMES: &[&str] = &[
    "actuate_trunk",
    "charge_port_door_close",
    "charge_port_door_open",
    "door_lock",
    "door_unlock",
    "flash_lights",
    "guest_mode",
    "honk_horn",
    "lock",
    "reset_pin_to_drive_pin",
    "reset_valet_pin",
    "set_pin_to_drive",
    "set_sentry_mode",
    "set_valet_mode",
    "speed_limit_activate",
    "speed_limit_clear_pin",
    "speed_limit_deactivate",
    "speed_limit_set_limit",
    "sun_roof_control",
    "trigger_homelink",
    "unlock",
    "window_control",
];

#[derive(Deserialize)]
struct OnParams {
    on: bool,
}

#[derive(Deserialize)]
struct OnPasswordParams {
    on: bool,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct PinParams {
    pin: String,
}

#[derive(Deserialize)]
struct EnableParams {
    enable: bool,
}

#[derive(Deserialize)]
struct TrunkParams {
    which_trunk: Trunk,
}

#[derive(Deserialize)]
struct WindowParams {
    command: WindowAction,
}

#[derive(Deserialize)]
struct SpeedLimitParams {
    limit_mph: f64,
}

#[derive(Deserialize)]
struct HomelinkParams {
    lat: f32,
    lon: f32,
}

#[derive(Deserialize)]
struct SunroofParams {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    percent: Option<u8>,
}

fn parse<T: DeserializeOwned>(params: &Params) -> Result<T, VehicleError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| VehicleError::InvalidParameters(e.to_string()))
}

fn sunroof_level(params: &Params) -> Result<u8, VehicleError> {
    let SunroofParams { state, percent } = parse(params)?;

    match (state.as_deref(), percent) {
        (_, Some(percent)) if percent <= 100 => Ok(percent),
        (_, Some(percent)) => Err(VehicleError::InvalidParameters(format!(
            "sunroof percent {percent} out of range"
        ))),
        (Some("close"), None) => Ok(0),
        (Some("vent"), None) => Ok(15),
        (Some(other), None) => Err(VehicleError::InvalidParameters(format!(
            "unknown sunroof state {other}"
        ))),
        (None, None) => Err(VehicleError::InvalidParameters(
            "expected state or percent".to_string(),
        )),
    }
}

impl Command {
    /// Maps a command name and its parameters to an action.
    ///
    /// # Errors
    ///
    /// Returns [`VehicleError::UnknownCommand`] for names outside the
    /// catalogue and [`VehicleError::InvalidParameters`] for missing or
    /// ill-typed parameters.
    pub fn lookup(name: &str, params: &Params) -> Result<CommandAction, VehicleError> {
        if RELAY_ONLY.contains(&name) {
            return Ok(CommandAction::Relay);
        }

        let command = match name {
            "actuate_trunk" => {
                let TrunkParams { which_trunk } = parse(params)?;
                Self::ActuateTrunk(which_trunk)
            }
            "charge_port_door_close" => Self::ChargePortClose,
            "charge_port_door_open" => Self::ChargePortOpen,
            "door_lock" | "lock" => Self::Lock,
            "door_unlock" | "unlock" => Self::Unlock,
            "flash_lights" => Self::FlashLights,
            "guest_mode" => {
                let EnableParams { enable } = parse(params)?;
                Self::GuestMode { enable }
            }
            "honk_horn" => Self::HonkHorn,
            "reset_pin_to_drive_pin" => Self::ResetPinToDrive,
            "reset_valet_pin" => Self::ResetValetPin,
            "set_pin_to_drive" => {
                let OnPasswordParams { on, password } = parse(params)?;
                Self::SetPinToDrive { on, password }
            }
            "set_sentry_mode" => {
                let OnParams { on } = parse(params)?;
                Self::SentryMode { on }
            }
            "set_valet_mode" => {
                let OnPasswordParams { on, password } = parse(params)?;
                Self::ValetMode { on, password }
            }
            "speed_limit_activate" => {
                let PinParams { pin } = parse(params)?;
                Self::SpeedLimitActivate { pin }
            }
            "speed_limit_clear_pin" => {
                let PinParams { pin } = parse(params)?;
                Self::ClearSpeedLimitPin { pin }
            }
            "speed_limit_deactivate" => {
                let PinParams { pin } = parse(params)?;
                Self::SpeedLimitDeactivate { pin }
            }
            "speed_limit_set_limit" => {
                let SpeedLimitParams { limit_mph } = parse(params)?;
                Self::SpeedLimitSetLimit { limit_mph }
            }
            "sun_roof_control" => Self::SunroofLevel(sunroof_level(params)?),
            "trigger_homelink" => {
                let HomelinkParams { lat, lon } = parse(params)?;
                Self::TriggerHomelink { lat, lon }
            }
            "window_control" => {
                let WindowParams { command } = parse(params)?;
                Self::Window(command)
            }
            other => return Err(VehicleError::UnknownCommand(other.to_string())),
        };

        Ok(CommandAction::Local(command))
    }

    /// Canonical command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ActuateTrunk(_) => "actuate_trunk",
            Self::ChargePortClose => "charge_port_door_close",
            Self::ChargePortOpen => "charge_port_door_open",
            Self::ClearSpeedLimitPin { .. } => "speed_limit_clear_pin",
            Self::FlashLights => "flash_lights",
            Self::GuestMode { .. } => "guest_mode",
            Self::HonkHorn => "honk_horn",
            Self::Lock => "door_lock",
            Self::ResetPinToDrive => "reset_pin_to_drive_pin",
            Self::ResetValetPin => "reset_valet_pin",
            Self::SetPinToDrive { .. } => "set_pin_to_drive",
            Self::SentryMode { .. } => "set_sentry_mode",
            Self::ValetMode { .. } => "set_valet_mode",
            Self::SpeedLimitActivate { .. } => "speed_limit_activate",
            Self::SpeedLimitDeactivate { .. } => "speed_limit_deactivate",
            Self::SpeedLimitSetLimit { .. } => "speed_limit_set_limit",
            Self::SunroofLevel(_) => "sun_roof_control",
            Self::TriggerHomelink { .. } => "trigger_homelink",
            Self::Unlock => "door_unlock",
            Self::Window(_) => "window_control",
        }
    }

    /// The vehicle domain that executes this command.
    #[must_use]
    pub const fn domain(&self) -> Domain {
        match self {
            Self::ActuateTrunk(_) | Self::Lock | Self::Unlock => Domain::VehicleSecurity,
            _ => Domain::Infotainment,
        }
    }
}
