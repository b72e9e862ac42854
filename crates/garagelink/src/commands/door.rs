//! Door subcommand handlers: watch, status, open, close.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use garagelink_core::{DoorSnapshot, GarageDoor, TargetState};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, Event};

/// How long `open` / `close` linger for the controller's reaction.
const SETTLE: Duration = Duration::from_secs(3);

// ── Helpers ─────────────────────────────────────────────────────────

async fn connect(door: &GarageDoor, global: &GlobalOpts) -> Result<(), CliError> {
    door.start();
    door.wait_connected(Duration::from_secs(global.timeout)).await?;
    Ok(())
}

async fn disconnect(door: &GarageDoor) {
    door.shutdown();
    door.join().await;
}

/// First snapshot that differs from `sent`, if one shows up within `settle`.
async fn reaction(
    snapshots: &mut watch::Receiver<DoorSnapshot>,
    sent: DoorSnapshot,
    settle: Duration,
) -> Option<DoorSnapshot> {
    match tokio::time::timeout(settle, snapshots.wait_for(|s| *s != sent)).await {
        Ok(Ok(snapshot)) => Some(*snapshot),
        _ => None,
    }
}

fn emit(global: &GlobalOpts, event: &Event) -> Result<(), CliError> {
    output::print_output(&output::render_event(global.output, event)?);
    Ok(())
}

// ── Watch ───────────────────────────────────────────────────────────

/// Print every state change and connectivity note until Ctrl-C.
pub async fn watch(door: &GarageDoor, global: &GlobalOpts) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let events = tx.clone();
    door.on_current_state_changed(move |state| {
        let _ = events.send(Event::CurrentState { state: *state });
    });
    let events = tx.clone();
    door.on_target_state_changed(move |state| {
        let _ = events.send(Event::TargetState { state: *state });
    });
    let events = tx.clone();
    door.on_obstruction_changed(move |detected| {
        let _ = events.send(Event::Obstruction {
            detected: *detected,
        });
    });
    door.on_connectivity_note(move |message| {
        let _ = tx.send(Event::Connectivity {
            message: message.to_string(),
        });
    });

    door.start();

    loop {
        tokio::select! {
            biased;
            result = tokio::signal::ctrl_c() => {
                result?;
                debug!("interrupted, shutting down");
                break;
            }
            Some(event) = rx.recv() => emit(global, &event)?,
        }
    }

    disconnect(door).await;
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

/// Wait for the first push that carries a current state, print, exit.
pub async fn status(door: &GarageDoor, global: &GlobalOpts) -> Result<(), CliError> {
    let mut snapshots = door.subscribe();
    connect(door, global).await?;

    let wait = Duration::from_secs(global.timeout);
    let first = tokio::time::timeout(wait, snapshots.wait_for(|s| s.current.is_some())).await;

    let result = match first {
        Ok(Ok(snapshot)) => {
            let snapshot = *snapshot;
            output::render_snapshot(global.output, &door.config().host, &snapshot)
                .map(|text| output::print_output(&text))
        }
        Ok(Err(_)) => Err(CliError::Internal {
            message: "door state channel closed".into(),
        }),
        Err(_) => Err(CliError::Timeout {
            host: door.config().host.clone(),
            seconds: global.timeout,
        }),
    };

    disconnect(door).await;
    result
}

// ── Open / Close ────────────────────────────────────────────────────

/// Send one door command, then report the controller's reaction if it
/// arrives promptly.
pub async fn move_door(
    door: &GarageDoor,
    global: &GlobalOpts,
    target: TargetState,
) -> Result<(), CliError> {
    let mut snapshots = door.subscribe();
    if let Err(e) = connect(door, global).await {
        disconnect(door).await;
        return Err(e);
    }

    // Only changes after this point count as the reaction to our command.
    let sent = *snapshots.borrow_and_update();
    if let Err(e) = door.request_target_state(target.is_closed()) {
        disconnect(door).await;
        return Err(e.into());
    }

    emit(
        global,
        &Event::CommandSent {
            target,
            host: door.config().host.clone(),
        },
    )?;

    if let Some(snapshot) = reaction(&mut snapshots, sent, SETTLE).await {
        output::print_output(&output::render_snapshot(
            global.output,
            &door.config().host,
            &snapshot,
        )?);
    } else {
        debug!("no status push within {}s", SETTLE.as_secs());
    }

    disconnect(door).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use garagelink_core::DoorState;

    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    fn snapshot(current: DoorState) -> DoorSnapshot {
        DoorSnapshot {
            current: Some(current),
            ..DoorSnapshot::default()
        }
    }

    #[tokio::test]
    async fn push_before_the_command_is_not_a_reaction() {
        let (tx, mut rx) = watch::channel(DoorSnapshot::default());

        // Lands after the handshake, before the command goes out.
        tx.send_replace(snapshot(DoorState::Closed));

        let sent = *rx.borrow_and_update();
        assert_eq!(reaction(&mut rx, sent, SHORT).await, None);

        // Re-publishing the same state is not a reaction either.
        tx.send_replace(snapshot(DoorState::Closed));
        assert_eq!(reaction(&mut rx, sent, SHORT).await, None);
    }

    #[tokio::test]
    async fn change_after_the_command_is_reported() {
        let (tx, mut rx) = watch::channel(snapshot(DoorState::Closed));
        let sent = *rx.borrow_and_update();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send_replace(snapshot(DoorState::Opening));
            // Keep the channel open while the receiver looks.
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        assert_eq!(
            reaction(&mut rx, sent, Duration::from_secs(2)).await,
            Some(snapshot(DoorState::Opening))
        );
    }
}
