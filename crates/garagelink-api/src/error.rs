use thiserror::Error;

/// Top-level error type for the `garagelink-api` crate.
///
/// Covers every failure mode of the device link: address resolution,
/// websocket handshake, session loss, and the JSON wire codec.
/// `garagelink-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Resolution ──────────────────────────────────────────────────
    /// The configured host could not be turned into a connectable address.
    #[error("Could not resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    // ── Handshake ───────────────────────────────────────────────────
    /// The websocket handshake did not complete in time.
    #[error("Handshake with {url} timed out after {timeout_secs}s")]
    HandshakeTimeout { url: String, timeout_secs: u64 },

    /// The device (or something in between) refused the handshake.
    #[error("Handshake with {url} refused: {reason}")]
    HandshakeRefused { url: String, reason: String },

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Session ─────────────────────────────────────────────────────
    /// An established session ended (close frame, socket error, EOF).
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// A send was attempted while no session is established.
    #[error("Not connected")]
    NotConnected,

    // ── Wire codec ──────────────────────────────────────────────────
    /// Outbound message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Inbound frame was not a JSON object.
    #[error("Failed to decode message: {message}")]
    Decode { message: String },
}

impl Error {
    /// Returns `true` if the connection manager should simply retry.
    ///
    /// Every link-level failure is transient; only caller mistakes
    /// (sending while disconnected, bad URLs, unencodable payloads) are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Resolution { .. }
            | Self::HandshakeTimeout { .. }
            | Self::HandshakeRefused { .. }
            | Self::ConnectionLost { .. }
            | Self::Decode { .. } => true,
            Self::NotConnected | Self::InvalidUrl(_) | Self::Encode(_) => false,
        }
    }
}
