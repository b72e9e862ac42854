// ── Runtime bridge configuration ──
//
// Describes *how* to reach one garage door controller and how the bridge
// should behave. Never touches disk: the CLI (via `garagelink-config`)
// builds a `BridgeConfig` and hands it in.

use std::sync::Arc;
use std::time::Duration;

use garagelink_api::{
    ConnectionSettings, ExponentialBackoff, NameResolver, Resolve, StaticResolver,
};

pub use garagelink_api::Credentials;

pub const DEFAULT_PORT: u16 = 81;
pub const DEFAULT_CONTACT_TIME_MS: u64 = 1000;
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// How the configured host becomes a dialable address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressMode {
    /// Look the name up (mDNS / DNS) before every connection attempt.
    #[default]
    Resolve,
    /// Dial the host exactly as configured.
    Static,
}

/// Configuration for bridging a single controller.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Literal address or resolvable name (e.g. `garage.local`).
    pub host: String,
    pub port: u16,
    /// Accessory display name.
    pub name: String,
    pub serial: String,
    pub credentials: Option<Credentials>,
    /// Whether `ObstructionDetected` pushes are examined at all.
    pub obstruction_sensor: bool,
    /// Negotiated with the controller after every handshake.
    pub reverse_obstruction_sensor: bool,
    /// Relay pulse length sent with every door command.
    pub contact_time_ms: u64,
    pub address_mode: AddressMode,
    pub resolve_timeout: Duration,
    pub handshake_timeout: Duration,
    pub reconnect: ExponentialBackoff,
}

impl BridgeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            serial: host.clone(),
            host,
            port,
            name: "Garage Door".into(),
            credentials: None,
            obstruction_sensor: true,
            reverse_obstruction_sensor: false,
            contact_time_ms: DEFAULT_CONTACT_TIME_MS,
            address_mode: AddressMode::Resolve,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ExponentialBackoff::default(),
        }
    }

    /// Settings for the underlying [`Connection`](garagelink_api::Connection).
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            credentials: self.credentials.clone(),
            reverse_obstruction_sensor: self.reverse_obstruction_sensor,
            handshake_timeout: self.handshake_timeout,
        }
    }

    /// Resolver matching [`address_mode`](Self::address_mode).
    pub fn resolver(&self) -> Arc<dyn Resolve> {
        match self.address_mode {
            AddressMode::Resolve => Arc::new(NameResolver::new(self.resolve_timeout)),
            AddressMode::Static => Arc::new(StaticResolver),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::new("garage.local", DEFAULT_PORT);
        assert_eq!(config.contact_time_ms, 1000);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.address_mode, AddressMode::Resolve);
        assert!(config.obstruction_sensor);
        assert!(!config.reverse_obstruction_sensor);
        assert_eq!(config.serial, "garage.local");
    }

    #[test]
    fn connection_settings_carry_negotiation_flag_and_credentials() {
        let mut config = BridgeConfig::new("10.0.0.40", 81);
        config.reverse_obstruction_sensor = true;
        config.credentials = Some(Credentials {
            username: "admin".into(),
            password: SecretString::from("secret".to_string()),
        });

        let settings = config.connection_settings();
        assert_eq!(settings.host, "10.0.0.40");
        assert_eq!(settings.port, 81);
        assert!(settings.reverse_obstruction_sensor);
        assert_eq!(
            settings.credentials.map(|c| c.username).as_deref(),
            Some("admin")
        );
    }
}
