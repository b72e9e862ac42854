// ── Canonical door model ──
//
// The state surfaced to the automation host. Wire spellings live in
// `garagelink_api::wire`; `convert` maps between the two.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Where the door actually is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DoorState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
}

/// Where the door was last told (or last known) to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetState {
    Open,
    Closed,
}

impl TargetState {
    pub fn from_closed(closed: bool) -> Self {
        if closed { Self::Closed } else { Self::Open }
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// The canonical triple. `None` until the controller first reports a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorSnapshot {
    pub current: Option<DoorState>,
    pub target: Option<TargetState>,
    pub obstruction: Option<bool>,
}

/// Static accessory metadata handed to the automation host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
}
