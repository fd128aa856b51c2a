//! Contracts between the command proxy and the vehicle, account and command
//! collaborators.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod account;
mod command;
mod error;
mod vehicle;

pub use account::{Account, AccountResolver};
pub use command::{COMMAND_NAMES, Command, CommandAction, Params, Trunk, WindowAction};
pub use error::VehicleError;
pub use vehicle::Vehicle;

pub use vcmd_session_cache::Domain;
