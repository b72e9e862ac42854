//! Device link for ESP8266-based garage door controllers.
//!
//! - [`resolver`] turns a host name or address into a dialable [`Endpoint`],
//!   freshly for every connection attempt.
//! - [`connection`] owns the websocket, drives the connect / reconnect state
//!   machine and exposes send plus observer registration.
//! - [`wire`] defines the JSON status and command messages.
//! - [`observer`] is the ordered handler list used for event fan-out.

pub mod connection;
pub mod error;
pub mod observer;
pub mod resolver;
pub mod wire;

pub use connection::{
    Connection, ConnectionSettings, ConnectionStatus, ExponentialBackoff, FixedDelay,
    ReconnectPolicy,
};
pub use error::Error;
pub use observer::Observers;
pub use resolver::{Credentials, Endpoint, NameResolver, Resolve, StaticResolver};
pub use wire::{Command, StatusMessage, WireDoorState, WireTargetState};
