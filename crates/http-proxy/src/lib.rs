//! HTTP front end dispatching vehicle commands over local encrypted sessions,
//! falling back to the cloud REST API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod proxy;
mod relay;
mod request;
mod response;
mod route;
mod server;

pub use config::*;
pub use error::*;
pub use proxy::*;
pub use relay::*;
pub use request::*;
pub use response::*;
pub use route::*;
pub use server::*;
