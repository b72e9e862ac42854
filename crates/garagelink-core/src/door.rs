// ── Garage door bridge ──
//
// Owns the connection to one controller and keeps the canonical door
// state in sync with its status pushes. Door commands go out fire-and-forget;
// their effect comes back later as ordinary status pushes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use garagelink_api::{
    Command, Connection, ConnectionStatus, Observers, ReconnectPolicy, Resolve, StatusMessage,
    WireTargetState,
};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{AccessoryInfo, DoorSnapshot, DoorState, TargetState};

const MANUFACTURER: &str = "oznu-platform";
const MODEL: &str = "garage-door";

// ── DoorSync ─────────────────────────────────────────────────────────

/// Canonical state plus the per-field change observers.
struct DoorSync {
    obstruction_sensor: bool,
    state: watch::Sender<DoorSnapshot>,
    current_changed: Observers<DoorState>,
    target_changed: Observers<TargetState>,
    obstruction_changed: Observers<bool>,
}

/// Fields that actually changed while applying one status push.
#[derive(Default)]
struct Changes {
    current: Option<DoorState>,
    target: Option<TargetState>,
    obstruction: Option<bool>,
}

impl DoorSync {
    fn new(obstruction_sensor: bool) -> Self {
        let (state, _) = watch::channel(DoorSnapshot::default());
        Self {
            obstruction_sensor,
            state,
            current_changed: Observers::new(),
            target_changed: Observers::new(),
            obstruction_changed: Observers::new(),
        }
    }

    /// Apply one status push. Each field is independent; absent fields
    /// leave the previous value alone.
    fn apply(&self, message: &StatusMessage) {
        let mut changes = Changes::default();

        self.state.send_if_modified(|snapshot| {
            if let Some(current) = message.current_door_state.map(DoorState::from) {
                if snapshot.current != Some(current) {
                    snapshot.current = Some(current);
                    changes.current = Some(current);
                }
            }

            if let Some(target) = message.target_door_state.map(TargetState::from) {
                if snapshot.target != Some(target) {
                    snapshot.target = Some(target);
                    changes.target = Some(target);
                }
            }

            if self.obstruction_sensor {
                if let Some(obstruction) = message.obstruction_detected {
                    if snapshot.obstruction != Some(obstruction) {
                        snapshot.obstruction = Some(obstruction);
                        changes.obstruction = Some(obstruction);
                    }
                }
            }

            changes.current.is_some() || changes.target.is_some() || changes.obstruction.is_some()
        });

        // Observers run after the watch lock is released.
        if let Some(current) = changes.current {
            debug!(%current, "current door state changed");
            self.current_changed.notify(&current);
        }
        if let Some(target) = changes.target {
            debug!(%target, "target door state changed");
            self.target_changed.notify(&target);
        }
        if let Some(obstruction) = changes.obstruction {
            debug!(obstruction, "obstruction changed");
            self.obstruction_changed.notify(&obstruction);
        }
    }
}

// ── GarageDoor ───────────────────────────────────────────────────────

/// The bridge between one controller and one consumer.
///
/// Construct it, register observers, then [`start`](Self::start). State
/// flows in through the connection's message handler; commands flow out
/// through [`request_target_state`](Self::request_target_state).
pub struct GarageDoor {
    config: BridgeConfig,
    connection: Connection,
    sync: Arc<DoorSync>,
}

impl GarageDoor {
    pub fn new(config: BridgeConfig) -> Self {
        let resolver = config.resolver();
        let policy = Arc::new(config.reconnect.clone());
        Self::from_parts(config, resolver, policy)
    }

    /// Like [`new`](Self::new) with an explicit resolver and reconnect policy.
    pub fn from_parts(
        config: BridgeConfig,
        resolver: Arc<dyn Resolve>,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        let connection = Connection::from_parts(config.connection_settings(), resolver, policy);
        let sync = Arc::new(DoorSync::new(config.obstruction_sensor));

        let inbound = Arc::clone(&sync);
        connection.on_message(move |message| inbound.apply(message));

        Self {
            config,
            connection,
            sync,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn accessory(&self) -> AccessoryInfo {
        AccessoryInfo {
            name: self.config.name.clone(),
            manufacturer: MANUFACTURER.into(),
            model: MODEL.into(),
            serial: self.config.serial.clone(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Begin connecting. Must be called inside a Tokio runtime.
    pub fn start(&self) {
        info!(host = %self.config.host, port = self.config.port, "starting garage door bridge");
        self.connection.start();
    }

    /// Release the connection and cancel any scheduled reconnect.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    /// Wait for the connection task to wind down after [`shutdown`](Self::shutdown).
    pub async fn join(&self) {
        self.connection.join().await;
    }

    // ── Connectivity ─────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe_status()
    }

    /// Wait until the link reaches `Connected`, or give up after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut status = self.connection.subscribe_status();
        let connected = status.wait_for(|s| *s == ConnectionStatus::Connected);

        match tokio::time::timeout(timeout, connected).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoreError::Internal("connection status channel closed".into())),
            Err(_) => Err(CoreError::Timeout {
                host: self.config.host.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Apply a status push to the canonical state.
    ///
    /// Called automatically for every frame received on the connection.
    pub fn handle_inbound(&self, message: &StatusMessage) {
        self.sync.apply(message);
    }

    pub fn snapshot(&self) -> DoorSnapshot {
        *self.sync.state.borrow()
    }

    /// Watch receiver that fires whenever any canonical field changes.
    pub fn subscribe(&self) -> watch::Receiver<DoorSnapshot> {
        self.sync.state.subscribe()
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Ask the door to move. Returns immediately; the result is the
    /// acknowledgment.
    ///
    /// Fails with [`CoreError::NotConnected`] (and sends nothing) while the
    /// link is down. Commands are never queued for later.
    pub fn request_target_state(&self, desired_closed: bool) -> Result<(), CoreError> {
        if !self.connection.is_connected() {
            error!("Garage Door Not Connected - {}", self.config.host);
            return Err(self.not_connected());
        }

        let target = WireTargetState::from(TargetState::from_closed(desired_closed));
        info!("Sending {target} to Garage Door.");

        let command = Command::Door {
            target,
            contact_time: self.config.contact_time_ms,
        };
        self.connection
            .send(&command)
            .map_err(|e| CoreError::from_link(e, &self.config.host))
    }

    pub fn open(&self) -> Result<(), CoreError> {
        self.request_target_state(false)
    }

    pub fn close(&self) -> Result<(), CoreError> {
        self.request_target_state(true)
    }

    fn not_connected(&self) -> CoreError {
        CoreError::NotConnected {
            host: self.config.host.clone(),
        }
    }

    // ── Observers ────────────────────────────────────────────────

    pub fn on_current_state_changed<F>(&self, handler: F)
    where
        F: Fn(&DoorState) + Send + Sync + 'static,
    {
        self.sync.current_changed.register(handler);
    }

    pub fn on_target_state_changed<F>(&self, handler: F)
    where
        F: Fn(&TargetState) + Send + Sync + 'static,
    {
        self.sync.target_changed.register(handler);
    }

    /// Never fires when the obstruction sensor is disabled in the config.
    pub fn on_obstruction_changed<F>(&self, handler: F)
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.sync.obstruction_changed.register(handler);
    }

    /// Human-readable connectivity notes, for the host's log.
    pub fn on_connectivity_note<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.connection.on_status_event(handler);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use garagelink_api::{WireDoorState, WireTargetState};

    use super::*;

    fn door() -> GarageDoor {
        GarageDoor::new(BridgeConfig::new("garage.local", 81))
    }

    fn status(json: &str) -> StatusMessage {
        StatusMessage::decode(json).unwrap()
    }

    #[test]
    fn starts_unknown() {
        assert_eq!(door().snapshot(), DoorSnapshot::default());
    }

    #[test]
    fn current_state_only_updates_current() {
        let door = door();
        door.handle_inbound(&status(r#"{"TargetDoorState":"OPEN","ObstructionDetected":false}"#));
        door.handle_inbound(&status(r#"{"CurrentDoorState":"OPENING"}"#));

        assert_eq!(
            door.snapshot(),
            DoorSnapshot {
                current: Some(DoorState::Opening),
                target: Some(TargetState::Open),
                obstruction: Some(false),
            }
        );
    }

    #[test]
    fn target_and_obstruction_leave_current_alone() {
        let door = door();
        door.handle_inbound(&status(r#"{"CurrentDoorState":"OPEN"}"#));
        door.handle_inbound(&status(r#"{"TargetDoorState":"CLOSED","ObstructionDetected":true}"#));

        let snap = door.snapshot();
        assert_eq!(snap.current, Some(DoorState::Open));
        assert_eq!(snap.target, Some(TargetState::Closed));
        assert_eq!(snap.obstruction, Some(true));
    }

    #[test]
    fn partial_updates_never_clobber() {
        let door = door();
        door.handle_inbound(&status(
            r#"{"CurrentDoorState":"CLOSED","TargetDoorState":"CLOSED","ObstructionDetected":false}"#,
        ));
        let before = door.snapshot();

        for partial in [
            "{}",
            r#"{"unrelated":42}"#,
            r#"{"CurrentDoorState":"HALFWAY"}"#,
            r#"{"TargetDoorState":null}"#,
        ] {
            door.handle_inbound(&status(partial));
            assert_eq!(door.snapshot(), before, "after {partial}");
        }

        // Non-object frames are rejected whole, never mapped by position.
        for frame in [r#"["OPEN","STOPPED",true]"#, "[null,null,null]", "true"] {
            if let Ok(message) = StatusMessage::decode(frame) {
                door.handle_inbound(&message);
            }
            assert_eq!(door.snapshot(), before, "after {frame}");
        }
    }

    #[test]
    fn non_boolean_obstruction_is_ignored() {
        let door = door();
        door.handle_inbound(&status(r#"{"ObstructionDetected":false}"#));

        for bogus in [r#""true""#, "1", "0", r#"{"x":true}"#, "[true]"] {
            door.handle_inbound(&status(&format!(r#"{{"ObstructionDetected":{bogus}}}"#)));
            assert_eq!(door.snapshot().obstruction, Some(false), "after {bogus}");
        }
    }

    #[test]
    fn obstruction_ignored_without_sensor() {
        let mut config = BridgeConfig::new("10.0.0.40", 81);
        config.obstruction_sensor = false;
        let door = GarageDoor::new(config);

        let fired = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&fired);
        door.on_obstruction_changed(move |_| *counter.lock().unwrap() += 1);

        door.handle_inbound(&status(r#"{"ObstructionDetected":true,"CurrentDoorState":"OPEN"}"#));

        assert_eq!(door.snapshot().obstruction, None);
        assert_eq!(door.snapshot().current, Some(DoorState::Open));
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn observers_fire_only_on_change() {
        let door = door();
        let events = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&events);
        door.on_current_state_changed(move |s| log.lock().unwrap().push(format!("current:{s}")));
        let log = Arc::clone(&events);
        door.on_target_state_changed(move |s| log.lock().unwrap().push(format!("target:{s}")));
        let log = Arc::clone(&events);
        door.on_obstruction_changed(move |o| log.lock().unwrap().push(format!("obstruction:{o}")));

        door.handle_inbound(&status(
            r#"{"CurrentDoorState":"CLOSING","TargetDoorState":"CLOSED","ObstructionDetected":false}"#,
        ));
        door.handle_inbound(&status(r#"{"CurrentDoorState":"CLOSING","TargetDoorState":"CLOSED"}"#));
        door.handle_inbound(&status(r#"{"CurrentDoorState":"CLOSED"}"#));

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "current:closing",
                "target:closed",
                "obstruction:false",
                "current:closed",
            ]
        );
    }

    #[test]
    fn watch_subscribers_see_changes() {
        let door = door();
        let mut rx = door.subscribe();

        door.handle_inbound(&status(r#"{"CurrentDoorState":"STOPPED"}"#));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().current, Some(DoorState::Stopped));

        door.handle_inbound(&status(r#"{"CurrentDoorState":"STOPPED"}"#));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn request_while_disconnected_fails_fast() {
        let door = door();
        for desired_closed in [false, true] {
            let result = door.request_target_state(desired_closed);
            assert!(
                matches!(result, Err(CoreError::NotConnected { ref host }) if host == "garage.local"),
                "got {result:?}"
            );
        }
    }

    #[test]
    fn accessory_metadata() {
        let mut config = BridgeConfig::new("garage.local", 81);
        config.serial = "ESP-00A1B2".into();
        let info = GarageDoor::new(config).accessory();
        assert_eq!(info.manufacturer, "oznu-platform");
        assert_eq!(info.model, "garage-door");
        assert_eq!(info.serial, "ESP-00A1B2");
        assert_eq!(info.name, "Garage Door");
    }

    #[test]
    fn wire_values_convert_through_handle_inbound() {
        let door = door();
        door.handle_inbound(&StatusMessage {
            target_door_state: Some(WireTargetState::Open),
            current_door_state: Some(WireDoorState::Stopped),
            obstruction_detected: None,
        });
        assert_eq!(door.snapshot().current, Some(DoorState::Stopped));
        assert_eq!(door.snapshot().target, Some(TargetState::Open));
    }

    #[tokio::test]
    async fn wait_connected_times_out_when_unreachable() {
        let door = door();
        let result = door.wait_connected(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CoreError::Timeout { .. })));
    }
}
