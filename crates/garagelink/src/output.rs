//! Output formatting: plain text or JSON lines.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use garagelink_core::{DoorSnapshot, DoorState, TargetState};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Something worth telling the user about while connected.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    CurrentState { state: DoorState },
    TargetState { state: TargetState },
    Obstruction { detected: bool },
    Connectivity { message: String },
    CommandSent { target: TargetState, host: String },
}

#[derive(Serialize)]
struct SnapshotView<'a> {
    host: &'a str,
    #[serde(flatten)]
    snapshot: &'a DoorSnapshot,
}

/// Color only when writing to a terminal and `NO_COLOR` is unset.
pub fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

// ── Renderers ────────────────────────────────────────────────────────

pub fn render_event(format: OutputFormat, event: &Event) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(event)?),
        OutputFormat::Plain => Ok(plain_event(event, should_color())),
    }
}

pub fn render_snapshot(
    format: OutputFormat,
    host: &str,
    snapshot: &DoorSnapshot,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(&SnapshotView { host, snapshot })?),
        OutputFormat::Plain => Ok(plain_snapshot(snapshot, should_color())),
    }
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Plain text ───────────────────────────────────────────────────────

fn plain_event(event: &Event, color: bool) -> String {
    match event {
        Event::CurrentState { state } => format!("current: {}", paint_door(*state, color)),
        Event::TargetState { state } => format!("target: {}", paint_target(*state, color)),
        Event::Obstruction { detected } => {
            format!("obstruction: {}", paint_obstruction(*detected, color))
        }
        Event::Connectivity { message } => {
            if color {
                message.dimmed().to_string()
            } else {
                message.clone()
            }
        }
        Event::CommandSent { target, host } => {
            format!("sent {} to {host}", paint_target(*target, color))
        }
    }
}

fn plain_snapshot(snapshot: &DoorSnapshot, color: bool) -> String {
    let unknown = || "unknown".to_string();
    let current = snapshot
        .current
        .map_or_else(unknown, |s| paint_door(s, color));
    let target = snapshot
        .target
        .map_or_else(unknown, |s| paint_target(s, color));
    let obstruction = snapshot
        .obstruction
        .map_or_else(unknown, |o| paint_obstruction(o, color));

    format!("current: {current}\ntarget: {target}\nobstruction: {obstruction}")
}

fn paint_door(state: DoorState, color: bool) -> String {
    if !color {
        return state.to_string();
    }
    match state {
        DoorState::Open => state.yellow().to_string(),
        DoorState::Closed => state.green().to_string(),
        DoorState::Opening | DoorState::Closing => state.cyan().to_string(),
        DoorState::Stopped => state.red().to_string(),
    }
}

fn paint_target(state: TargetState, color: bool) -> String {
    if color {
        state.bold().to_string()
    } else {
        state.to_string()
    }
}

fn paint_obstruction(detected: bool, color: bool) -> String {
    match (detected, color) {
        (true, true) => "detected".red().bold().to_string(),
        (true, false) => "detected".into(),
        (false, _) => "clear".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plain_snapshot_marks_unknown_fields() {
        let snapshot = DoorSnapshot {
            current: Some(DoorState::Opening),
            target: Some(TargetState::Open),
            obstruction: None,
        };
        assert_eq!(
            plain_snapshot(&snapshot, false),
            "current: opening\ntarget: open\nobstruction: unknown"
        );
    }

    #[test]
    fn json_snapshot_includes_host() {
        let snapshot = DoorSnapshot {
            current: Some(DoorState::Closed),
            target: Some(TargetState::Closed),
            obstruction: Some(false),
        };
        let json: serde_json::Value = serde_json::from_str(
            &render_snapshot(OutputFormat::Json, "garage.local", &snapshot).unwrap(),
        )
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "host": "garage.local",
                "current": "closed",
                "target": "closed",
                "obstruction": false,
            })
        );
    }

    #[test]
    fn json_events_are_tagged() {
        let line = render_event(
            OutputFormat::Json,
            &Event::CommandSent {
                target: TargetState::Closed,
                host: "garage.local".into(),
            },
        )
        .unwrap();
        assert_eq!(
            line,
            r#"{"event":"command_sent","target":"closed","host":"garage.local"}"#
        );
    }

    #[test]
    fn plain_events() {
        assert_eq!(
            plain_event(&Event::Obstruction { detected: true }, false),
            "obstruction: detected"
        );
        assert_eq!(
            plain_event(
                &Event::CurrentState {
                    state: DoorState::Stopped
                },
                false
            ),
            "current: stopped"
        );
    }
}
