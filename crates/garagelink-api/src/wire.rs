// ── Wire codec ──
//
// JSON messages exchanged with the garage door controller, one object
// per websocket text frame. Inbound status pushes are decoded field by
// field: a field that is missing or of the wrong shape is treated as
// absent, it never fails the whole message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use crate::error::Error;

// ── Wire enums ───────────────────────────────────────────────────────

/// `CurrentDoorState` as the controller spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WireDoorState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
}

/// `TargetDoorState` as the controller spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WireTargetState {
    Open,
    Closed,
}

// ── StatusMessage ────────────────────────────────────────────────────

/// A status push from the controller.
///
/// Every field is independently optional. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    #[serde(rename = "TargetDoorState", skip_serializing_if = "Option::is_none")]
    pub target_door_state: Option<WireTargetState>,

    #[serde(rename = "CurrentDoorState", skip_serializing_if = "Option::is_none")]
    pub current_door_state: Option<WireDoorState>,

    #[serde(
        rename = "ObstructionDetected",
        skip_serializing_if = "Option::is_none"
    )]
    pub obstruction_detected: Option<bool>,
}

impl StatusMessage {
    /// Decode one inbound text frame.
    ///
    /// Fails only when the frame is not a JSON object.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let fields: Map<String, Value> = serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
        })?;
        Ok(Self {
            target_door_state: lenient(&fields, "TargetDoorState"),
            current_door_state: lenient(&fields, "CurrentDoorState"),
            obstruction_detected: lenient(&fields, "ObstructionDetected"),
        })
    }

    /// `true` when none of the known fields carried a usable value.
    pub fn is_empty(&self) -> bool {
        self.target_door_state.is_none()
            && self.current_door_state.is_none()
            && self.obstruction_detected.is_none()
    }
}

/// The value under `key`, kept only if it deserializes as `T`.
fn lenient<T: DeserializeOwned>(fields: &Map<String, Value>, key: &str) -> Option<T> {
    fields.get(key).and_then(|value| T::deserialize(value).ok())
}

// ── Command ──────────────────────────────────────────────────────────

/// Messages the bridge sends to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Sent once after every successful handshake.
    Negotiate {
        #[serde(rename = "reverseObstructionSensor")]
        reverse_obstruction_sensor: bool,
    },
    /// Pulse the contact relay towards the given target.
    Door {
        #[serde(rename = "TargetDoorState")]
        target: WireTargetState,
        /// Relay hold time in milliseconds.
        #[serde(rename = "contactTime")]
        contact_time: u64,
    },
}

impl Command {
    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a command as the controller would see it.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Decode {
            message: e.to_string(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
