//! Door-state synchronization between a garage door controller and an
//! automation host.
//!
//! - **[`GarageDoor`]**: the bridge facade. Owns one
//!   [`Connection`](garagelink_api::Connection), applies inbound status
//!   pushes to the canonical [`DoorSnapshot`] and turns host requests into
//!   door commands. Requests made while the link is down fail immediately
//!   with [`CoreError::NotConnected`]; nothing is queued.
//!
//! - **[`BridgeConfig`]**: everything needed to reach one controller. Built
//!   by the caller (usually from `garagelink-config`), never read from disk
//!   here.
//!
//! - **Domain model** ([`model`]): canonical door and target states, with
//!   conversions from the wire spellings in [`convert`].

pub mod config;
pub mod convert;
pub mod door;
pub mod error;
pub mod model;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AddressMode, BridgeConfig, Credentials};
pub use door::GarageDoor;
pub use error::CoreError;
pub use model::{AccessoryInfo, DoorSnapshot, DoorState, TargetState};

pub use garagelink_api::{ConnectionStatus, ExponentialBackoff};
