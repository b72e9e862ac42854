//! Persistent websocket link to a garage door controller, with auto-reconnect.
//!
//! A [`Connection`] owns exactly one socket. Its background task walks the
//! `Disconnected → Resolving → Connecting → Connected` state machine, and
//! any failure along the way drops it back to `Disconnected` and schedules
//! another attempt through a [`ReconnectPolicy`]. It never gives up.
//!
//! # Example
//!
//! ```rust,ignore
//! use garagelink_api::connection::{Connection, ConnectionSettings};
//!
//! let connection = Connection::new(ConnectionSettings::new("garage.local", 81));
//! connection.on_status_event(|note| println!("{note}"));
//! connection.on_message(|status| println!("{status:?}"));
//! connection.start();
//! ```

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::observer::Observers;
use crate::resolver::{Credentials, Endpoint, NameResolver, Resolve, resolve_endpoint};
use crate::wire::{Command, StatusMessage};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ── ConnectionStatus ─────────────────────────────────────────────────

/// Link state. Written only by the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionStatus {
    Disconnected,
    Resolving,
    Connecting,
    Connected,
}

// ── ConnectionSettings ───────────────────────────────────────────────

/// Everything the connection needs to reach one controller.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Literal address or resolvable name.
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    /// Sent as `reverseObstructionSensor` right after each handshake.
    pub reverse_obstruction_sensor: bool,
    pub handshake_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            reverse_obstruction_sensor: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

// ── Reconnect policies ───────────────────────────────────────────────

/// Decides how long to wait before the next connection attempt.
///
/// `attempt` counts consecutive failures, starting at 0. It resets after
/// a session that actually reached `Connected`.
pub trait ReconnectPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with jitter, capped at `max_delay`. Retries forever.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    /// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
    ///
    /// The jitter is derived from the attempt number, so it is deterministic.
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        let with_jitter = (capped * jitter_factor).max(0.0);

        Duration::try_from_secs_f64(with_jitter).unwrap_or(self.max_delay)
    }
}

/// Same delay after every failure.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl ReconnectPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Handle to the one connection a bridge keeps to its controller.
///
/// Dropping the handle cancels the background task, including any
/// pending reconnect sleep.
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    settings: ConnectionSettings,
    resolver: Arc<dyn Resolve>,
    policy: Arc<dyn ReconnectPolicy>,
    status: watch::Sender<ConnectionStatus>,
    /// Present only while `Connected`.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    status_events: Observers<str>,
    messages: Observers<StatusMessage>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connection with the default [`NameResolver`] and [`ExponentialBackoff`].
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::from_parts(
            settings,
            Arc::new(NameResolver::default()),
            Arc::new(ExponentialBackoff::default()),
        )
    }

    pub fn from_parts(
        settings: ConnectionSettings,
        resolver: Arc<dyn Resolve>,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            inner: Arc::new(ConnectionInner {
                settings,
                resolver,
                policy,
                status,
                outbound: Mutex::new(None),
                status_events: Observers::new(),
                messages: Observers::new(),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the connect/reconnect loop. Must be called inside a Tokio runtime.
    ///
    /// Idempotent: while the loop is alive a second call does nothing, so at
    /// most one connection attempt is ever in flight. After
    /// [`shutdown`](Self::shutdown) the connection stays down.
    pub fn start(&self) {
        if self.inner.cancel.is_cancelled() {
            debug!("connection already shut down, not starting");
            return;
        }

        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            trace!("connection loop already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run_loop(inner)));
    }

    /// Close the socket and stop retrying.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Wait for the background task to finish (after [`shutdown`](Self::shutdown)).
    pub async fn join(&self) {
        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
    }

    /// `true` while the background loop is alive.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Watch receiver for status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    // ── Messaging ────────────────────────────────────────────────

    /// Queue `command` on the live session.
    ///
    /// Never blocks. Fails with [`Error::NotConnected`] when there is no
    /// session; nothing is buffered for later.
    pub fn send(&self, command: &Command) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let text = command.encode()?;
        match lock(&self.inner.outbound).as_ref() {
            Some(tx) => tx.send(text).map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    /// Register a handler for human-readable connectivity notes.
    pub fn on_status_event<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.status_events.register(handler);
    }

    /// Register a handler for decoded status pushes, in wire order.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&StatusMessage) + Send + Sync + 'static,
    {
        self.inner.messages.register(handler);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// connect → serve → on failure, back off → reconnect. Exits only on cancel.
async fn run_loop(inner: Arc<ConnectionInner>) {
    let mut attempt: u32 = 0;

    loop {
        let error = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            result = inner.session() => match result {
                Err(e) => e,
                Ok(never) => match never {},
            },
        };

        inner.mark_disconnected();

        // A session that got as far as `Connected` starts a fresh backoff curve.
        if matches!(error, Error::ConnectionLost { .. }) {
            attempt = 0;
        }

        let delay = inner.policy.delay(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if error.is_transient() {
            warn!(error = %error, attempt, delay_ms, "connection attempt failed");
        } else {
            // Bad host or unencodable payload; retried all the same.
            error!(error = %error, attempt, delay_ms, "connection cannot be established");
        }
        inner.note(&format!(
            "{error} - retrying in {:.1}s",
            delay.as_secs_f64()
        ));

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    inner.mark_disconnected();
    debug!(host = %inner.settings.host, "connection loop exiting");
}

impl ConnectionInner {
    /// One full attempt. Only returns on failure.
    async fn session(&self) -> Result<Infallible, Error> {
        self.transition(ConnectionStatus::Resolving);
        let endpoint = resolve_endpoint(
            self.resolver.as_ref(),
            &self.settings.host,
            self.settings.port,
            self.settings.credentials.as_ref(),
        )
        .await?;

        let target = endpoint.redacted();
        self.transition(ConnectionStatus::Connecting);
        self.note(&format!("Connecting to {target}"));

        let request = handshake_request(&endpoint)?;

        let timeout = self.settings.handshake_timeout;
        let (ws_stream, _response) =
            match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
                Err(_) => {
                    return Err(Error::HandshakeTimeout {
                        url: target,
                        timeout_secs: timeout.as_secs(),
                    });
                }
                Ok(Err(e)) => {
                    return Err(Error::HandshakeRefused {
                        url: target,
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(pair)) => pair,
            };

        let (mut write, mut read) = ws_stream.split();

        // Negotiation goes out before the outbound queue exists, so it
        // always precedes any door command.
        let hello = Command::Negotiate {
            reverse_obstruction_sensor: self.settings.reverse_obstruction_sensor,
        }
        .encode()?;
        write.send(Message::text(hello)).await.map_err(lost)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *lock(&self.outbound) = Some(tx);
        self.transition(ConnectionStatus::Connected);
        self.note(&format!("Connected to {target}"));

        loop {
            tokio::select! {
                biased;
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings itself
                        trace!("websocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "closed by device".to_string(),
                            |cf| format!("closed by device (code {}): {}", cf.code, cf.reason),
                        );
                        return Err(Error::ConnectionLost { reason });
                    }
                    Some(Err(e)) => return Err(lost(e)),
                    None => {
                        return Err(Error::ConnectionLost {
                            reason: "stream ended".into(),
                        });
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                },
                outgoing = rx.recv() => {
                    let Some(text) = outgoing else {
                        return Err(Error::ConnectionLost {
                            reason: "outbound queue closed".into(),
                        });
                    };
                    trace!(payload = %text, "sending");
                    write.send(Message::text(text)).await.map_err(lost)?;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match StatusMessage::decode(text) {
            Ok(message) => {
                debug!(payload = text, "status received");
                self.messages.notify(&message);
            }
            Err(e) => debug!(error = %e, "ignoring undecodable frame"),
        }
    }

    fn transition(&self, next: ConnectionStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection status");
        }
    }

    fn mark_disconnected(&self) {
        lock(&self.outbound).take();
        self.transition(ConnectionStatus::Disconnected);
    }

    fn note(&self, message: &str) {
        info!(host = %self.settings.host, "{message}");
        self.status_events.notify(message);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Handshake request for `endpoint`, credentials as a basic-auth header.
fn handshake_request(endpoint: &Endpoint) -> Result<ClientRequestBuilder, Error> {
    let url = endpoint.base_url()?;
    let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
        |e: tungstenite::http::uri::InvalidUri| Error::HandshakeRefused {
            url: endpoint.redacted(),
            reason: e.to_string(),
        },
    )?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(ref creds) = endpoint.credentials {
        request = request.with_header("Authorization", basic_auth(creds));
    }
    Ok(request)
}

fn basic_auth(creds: &Credentials) -> String {
    let token = BASE64.encode(format!(
        "{}:{}",
        creds.username,
        creds.password.expose_secret()
    ));
    format!("Basic {token}")
}

fn lost(e: tungstenite::Error) -> Error {
    Error::ConnectionLost {
        reason: e.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn default_backoff() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let policy = ExponentialBackoff::default();

        let d0 = policy.delay(0);
        let d1 = policy.delay(1);
        let d2 = policy.delay(2);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        // Jitter tops out at 1.25x
        for attempt in [10, 100, u32::MAX] {
            let delay = policy.delay(attempt);
            assert!(
                delay <= Duration::from_millis(12_500),
                "delay at attempt {attempt} ({delay:?}) should be capped near max_delay"
            );
        }
    }

    #[test]
    fn backoff_with_unbounded_max_delay_does_not_overflow() {
        let policy = ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(u64::MAX),
        };

        for attempt in [0, 10, 64, 100, 1_000, u32::MAX] {
            let delay = policy.delay(attempt);
            assert!(delay >= Duration::from_millis(750), "attempt {attempt}: {delay:?}");
        }
        // Jitter pushes attempt 64 past what a Duration can hold.
        assert_eq!(policy.delay(64), policy.max_delay);
    }

    #[test]
    fn fixed_delay_ignores_attempt() {
        let policy = FixedDelay(Duration::from_millis(250));
        assert_eq!(policy.delay(0), policy.delay(42));
    }

    #[test]
    fn basic_auth_header_encodes_userinfo() {
        let creds = Credentials {
            username: "admin".into(),
            password: SecretString::from("password".to_string()),
        };
        assert_eq!(basic_auth(&creds), "Basic YWRtaW46cGFzc3dvcmQ=");
    }

    #[test]
    fn new_connection_is_disconnected() {
        let connection = Connection::new(ConnectionSettings::new("garage.local", 81));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert!(!connection.is_connected());
        assert!(!connection.is_running());
    }

    #[test]
    fn send_while_disconnected_reports_not_connected() {
        let connection = Connection::new(ConnectionSettings::new("garage.local", 81));
        let result = connection.send(&Command::Negotiate {
            reverse_obstruction_sensor: false,
        });
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn settings_defaults() {
        let settings = ConnectionSettings::new("10.0.0.2", 81);
        assert_eq!(settings.handshake_timeout, Duration::from_secs(10));
        assert!(!settings.reverse_obstruction_sensor);
        assert!(settings.credentials.is_none());
    }

    #[tokio::test]
    async fn start_after_shutdown_does_nothing() {
        let connection = Connection::new(ConnectionSettings::new("10.0.0.2", 81));
        connection.shutdown();
        connection.start();
        assert!(!connection.is_running());
    }
}
