//! Command dispatch for subcommands that need a live controller.

pub mod config_cmd;
pub mod door;

use garagelink_core::{GarageDoor, TargetState};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, door: &GarageDoor, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch => door::watch(door, global).await,
        Command::Status => door::status(door, global).await,
        Command::Open => door::move_door(door, global, TargetState::Open).await,
        Command::Close => door::move_door(door, global, TargetState::Closed).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal {
            message: "command does not use a controller connection".into(),
        }),
    }
}
