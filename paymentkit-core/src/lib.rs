#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
use strum::EnumString;

/// Target API environment for the SDK. Generally an app/client will run
/// against a single environment.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Test-mode API; no real money moves.
    Sandbox,
    /// Live API.
    Production,
}

mod action;
pub use action::*;

mod challenge;
pub use challenge::*;

mod confirm;
pub use confirm::*;

mod error;
pub use error::*;

mod intent;
pub use intent::*;

pub mod logger;

mod poller;
pub use poller::*;

mod redirect;
pub use redirect::*;

mod surface;
pub use surface::*;

mod transport;
pub use transport::*;

// private modules
mod defaults;
mod http_request;
mod settled;

uniffi::setup_scaffolding!("paymentkit_core");
