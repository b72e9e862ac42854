// ── Wire ↔ canonical conversions ──

use garagelink_api::{WireDoorState, WireTargetState};

use crate::model::{DoorState, TargetState};

impl From<WireDoorState> for DoorState {
    fn from(state: WireDoorState) -> Self {
        match state {
            WireDoorState::Open => Self::Open,
            WireDoorState::Closed => Self::Closed,
            WireDoorState::Opening => Self::Opening,
            WireDoorState::Closing => Self::Closing,
            WireDoorState::Stopped => Self::Stopped,
        }
    }
}

impl From<WireTargetState> for TargetState {
    fn from(state: WireTargetState) -> Self {
        match state {
            WireTargetState::Open => Self::Open,
            WireTargetState::Closed => Self::Closed,
        }
    }
}

impl From<TargetState> for WireTargetState {
    fn from(state: TargetState) -> Self {
        match state {
            TargetState::Open => Self::Open,
            TargetState::Closed => Self::Closed,
        }
    }
}
