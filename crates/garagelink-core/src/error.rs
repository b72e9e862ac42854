// ── Core error types ──
//
// What consumers of the bridge see. Link-level failures are retried inside
// the connection and only show up here when a caller asks for something
// that needs a live session.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// A door command was requested while the link is down. The command is
    /// dropped, not queued.
    #[error("Garage door not connected: {host}")]
    NotConnected { host: String },

    #[error("Cannot reach garage door at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Garage door at {host} did not connect within {timeout_secs}s")]
    Timeout { host: String, timeout_secs: u64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from link-layer errors ────────────────────────────────

impl CoreError {
    /// Map a link-layer error raised while talking to the controller at `host`.
    pub fn from_link(err: garagelink_api::Error, host: &str) -> Self {
        match err {
            garagelink_api::Error::Resolution { host, reason } => {
                CoreError::ConnectionFailed { host, reason }
            }
            garagelink_api::Error::HandshakeTimeout { url, timeout_secs } => {
                CoreError::ConnectionFailed {
                    host: host.into(),
                    reason: format!("handshake with {url} timed out after {timeout_secs}s"),
                }
            }
            garagelink_api::Error::HandshakeRefused { url, reason } => {
                CoreError::ConnectionFailed {
                    host: host.into(),
                    reason: format!("handshake with {url} refused: {reason}"),
                }
            }
            garagelink_api::Error::ConnectionLost { reason } => CoreError::ConnectionFailed {
                host: host.into(),
                reason: format!("connection lost: {reason}"),
            },
            garagelink_api::Error::NotConnected => CoreError::NotConnected { host: host.into() },
            garagelink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL for {host}: {e}"),
            },
            garagelink_api::Error::Encode(e) => {
                CoreError::Internal(format!("Failed to encode command: {e}"))
            }
            garagelink_api::Error::Decode { message } => {
                CoreError::Internal(format!("Failed to decode message: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_failure_maps_to_connection_failed() {
        let err = CoreError::from_link(
            garagelink_api::Error::Resolution {
                host: "garage.local".into(),
                reason: "no mDNS answer".into(),
            },
            "garage.local",
        );
        assert!(
            matches!(err, CoreError::ConnectionFailed { ref host, .. } if host == "garage.local")
        );
    }

    #[test]
    fn link_errors_carry_the_host() {
        let lost = CoreError::from_link(
            garagelink_api::Error::ConnectionLost {
                reason: "stream ended".into(),
            },
            "10.0.0.40",
        );
        assert_eq!(
            lost.to_string(),
            "Cannot reach garage door at 10.0.0.40: connection lost: stream ended"
        );

        let down = CoreError::from_link(garagelink_api::Error::NotConnected, "10.0.0.40");
        assert!(matches!(down, CoreError::NotConnected { ref host } if host == "10.0.0.40"));
    }

    #[test]
    fn not_connected_message_names_host() {
        let err = CoreError::NotConnected {
            host: "10.0.0.40".into(),
        };
        assert_eq!(err.to_string(), "Garage door not connected: 10.0.0.40");
    }
}
