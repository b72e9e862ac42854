//! Configuration for garagelink.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `garagelink_core::BridgeConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use garagelink_core::config::{DEFAULT_CONTACT_TIME_MS, DEFAULT_PORT};
use garagelink_core::{AddressMode, BridgeConfig, Credentials, ExponentialBackoff};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "GARAGELINK_CONFIG";
/// Environment variable consulted for the device password.
pub const PASSWORD_ENV: &str = "GARAGELINK_PASSWORD";

const KEYRING_SERVICE: &str = "garagelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    ProfileNotFound { name: String, available: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Values shared by every profile unless a profile overrides them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Relay pulse length, in milliseconds.
    #[serde(default = "default_contact_time")]
    pub contact_time: u64,

    /// Seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Seconds.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout: u64,

    /// Seconds.
    #[serde(default = "default_reconnect_initial_delay")]
    pub reconnect_initial_delay: u64,

    /// Seconds.
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            contact_time: default_contact_time(),
            handshake_timeout: default_handshake_timeout(),
            resolve_timeout: default_resolve_timeout(),
            reconnect_initial_delay: default_reconnect_initial_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
        }
    }
}

fn default_contact_time() -> u64 {
    DEFAULT_CONTACT_TIME_MS
}
fn default_handshake_timeout() -> u64 {
    10
}
fn default_resolve_timeout() -> u64 {
    5
}
fn default_reconnect_initial_delay() -> u64 {
    1
}
fn default_reconnect_max_delay() -> u64 {
    30
}

/// A named device profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// IP address or resolvable name (e.g., "garage.local").
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Accessory display name. Defaults to "Garage Door".
    pub name: Option<String>,

    /// Accessory serial number. Defaults to the host.
    pub serial: Option<String>,

    /// Username for the device's basic auth.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Report `ObstructionDetected` pushes.
    #[serde(default = "default_true")]
    pub obstruction_sensor: bool,

    /// Ask the controller to invert its obstruction input.
    #[serde(default)]
    pub reverse_obstruction_sensor: bool,

    /// Override `defaults.contact_time`.
    pub contact_time: Option<u64>,

    /// Look the host up before every connection attempt. Turn off to dial
    /// it verbatim.
    #[serde(default = "default_true")]
    pub resolve_host: bool,
}

impl Profile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            name: None,
            serial: None,
            username: None,
            password: None,
            password_env: None,
            obstruction_sensor: true,
            reverse_obstruction_sensor: false,
            contact_time: None,
            resolve_host: true,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profile_names(),
            })
    }

    /// Comma-separated profile names, or `(none)`.
    pub fn profile_names(&self) -> String {
        if self.profiles.is_empty() {
            "(none)".into()
        } else {
            self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path. `GARAGELINK_CONFIG` wins, then
/// platform conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    ProjectDirs::from("", "", "garagelink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("garagelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file is not an
/// error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("GARAGELINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Keyring entry holding a profile's password.
pub fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the device password: `password_env` → `GARAGELINK_PASSWORD`
/// → keyring → plaintext.
fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Some(val) = env(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Shared env var
    if let Some(val) = env(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Basic-auth credentials for a profile. `None` when no username is set:
/// the device then accepts unauthenticated connections.
fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    resolve_credentials_with(profile, profile_name, |name| std::env::var(name).ok())
}

fn resolve_credentials_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile.username.clone() else {
        return Ok(None);
    };
    let password = resolve_password_with(profile, profile_name, env)?;
    Ok(Some(Credentials { username, password }))
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `BridgeConfig` from a profile and the global defaults.
pub fn profile_to_bridge_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<BridgeConfig, ConfigError> {
    let credentials = resolve_credentials(profile, profile_name)?;
    bridge_config_with_credentials(profile, defaults, credentials)
}

/// Like [`profile_to_bridge_config`] with credentials already resolved
/// (e.g. from a command-line override).
pub fn bridge_config_with_credentials(
    profile: &Profile,
    defaults: &Defaults,
    credentials: Option<Credentials>,
) -> Result<BridgeConfig, ConfigError> {
    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }
    if profile.port == 0 {
        return Err(ConfigError::Validation {
            field: "port".into(),
            reason: "must be between 1 and 65535".into(),
        });
    }

    let contact_time_ms = profile.contact_time.unwrap_or(defaults.contact_time);
    if contact_time_ms == 0 {
        return Err(ConfigError::Validation {
            field: "contact_time".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if defaults.reconnect_initial_delay > defaults.reconnect_max_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_initial_delay".into(),
            reason: format!(
                "must not exceed reconnect_max_delay ({}s)",
                defaults.reconnect_max_delay
            ),
        });
    }

    let mut config = BridgeConfig::new(host, profile.port);
    if let Some(ref name) = profile.name {
        config.name.clone_from(name);
    }
    if let Some(ref serial) = profile.serial {
        config.serial.clone_from(serial);
    }
    config.credentials = credentials;
    config.obstruction_sensor = profile.obstruction_sensor;
    config.reverse_obstruction_sensor = profile.reverse_obstruction_sensor;
    config.contact_time_ms = contact_time_ms;
    config.address_mode = if profile.resolve_host {
        AddressMode::Resolve
    } else {
        AddressMode::Static
    };
    config.resolve_timeout = Duration::from_secs(defaults.resolve_timeout);
    config.handshake_timeout = Duration::from_secs(defaults.handshake_timeout);
    config.reconnect = ExponentialBackoff {
        initial_delay: Duration::from_secs(defaults.reconnect_initial_delay),
        max_delay: Duration::from_secs(defaults.reconnect_max_delay),
    };

    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.contact_time, 1000);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn profile_fields_and_defaults() {
        let (_dir, path) = write_config(
            r#"
default_profile = "garage"

[defaults]
contact_time = 800

[profiles.garage]
host = "garage.local"
username = "admin"

[profiles.shed]
host = "10.0.0.41"
port = 8081
obstruction_sensor = false
reverse_obstruction_sensor = true
resolve_host = false
contact_time = 250
"#,
        );

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("garage"));
        assert_eq!(config.defaults.contact_time, 800);
        assert_eq!(config.defaults.handshake_timeout, 10);

        let garage = config.profile("garage").unwrap();
        assert_eq!(garage.port, 81);
        assert!(garage.obstruction_sensor);
        assert!(!garage.reverse_obstruction_sensor);
        assert!(garage.resolve_host);

        let shed = config.profile("shed").unwrap();
        assert_eq!(shed.port, 8081);
        assert!(!shed.obstruction_sensor);
        assert!(shed.reverse_obstruction_sensor);
        assert_eq!(shed.contact_time, Some(250));
    }

    #[test]
    fn unknown_profile() {
        let mut config = Config::default();
        assert!(matches!(
            config.profile("attic"),
            Err(ConfigError::ProfileNotFound { name, available })
                if name == "attic" && available == "(none)"
        ));

        config.profiles.insert("garage".into(), Profile::new("garage.local"));
        config.profiles.insert("shed".into(), Profile::new("10.0.0.41"));
        assert!(matches!(
            config.profile("attic"),
            Err(ConfigError::ProfileNotFound { available, .. }) if available == "garage, shed"
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        let mut profile = Profile::new("garage.local");
        profile.username = Some("admin".into());
        config.profiles.insert("default".into(), profile);
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let profile = loaded.profile("default").unwrap();
        assert_eq!(profile.host, "garage.local");
        assert_eq!(profile.username.as_deref(), Some("admin"));
    }

    #[test]
    fn bridge_config_from_profile() {
        let mut profile = Profile::new(" 10.0.0.40 ");
        profile.name = Some("Workshop".into());
        profile.resolve_host = false;
        profile.reverse_obstruction_sensor = true;

        let defaults = Defaults {
            contact_time: 600,
            reconnect_max_delay: 60,
            ..Defaults::default()
        };
        let config = bridge_config_with_credentials(&profile, &defaults, None).unwrap();

        assert_eq!(config.host, "10.0.0.40");
        assert_eq!(config.port, 81);
        assert_eq!(config.name, "Workshop");
        assert_eq!(config.serial, "10.0.0.40");
        assert_eq!(config.contact_time_ms, 600);
        assert_eq!(config.address_mode, AddressMode::Static);
        assert!(config.reverse_obstruction_sensor);
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(60));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn profile_contact_time_overrides_default() {
        let mut profile = Profile::new("garage.local");
        profile.contact_time = Some(1500);
        let config = bridge_config_with_credentials(&profile, &Defaults::default(), None).unwrap();
        assert_eq!(config.contact_time_ms, 1500);
    }

    #[test]
    fn validation_errors() {
        let defaults = Defaults::default();

        let blank = Profile::new("  ");
        assert!(matches!(
            bridge_config_with_credentials(&blank, &defaults, None),
            Err(ConfigError::Validation { field, .. }) if field == "host"
        ));

        let mut zero_port = Profile::new("garage.local");
        zero_port.port = 0;
        assert!(matches!(
            bridge_config_with_credentials(&zero_port, &defaults, None),
            Err(ConfigError::Validation { field, .. }) if field == "port"
        ));

        let mut zero_pulse = Profile::new("garage.local");
        zero_pulse.contact_time = Some(0);
        assert!(matches!(
            bridge_config_with_credentials(&zero_pulse, &defaults, None),
            Err(ConfigError::Validation { field, .. }) if field == "contact_time"
        ));

        let inverted = Defaults {
            reconnect_initial_delay: 60,
            reconnect_max_delay: 30,
            ..Defaults::default()
        };
        assert!(matches!(
            bridge_config_with_credentials(&Profile::new("garage.local"), &inverted, None),
            Err(ConfigError::Validation { field, .. }) if field == "reconnect_initial_delay"
        ));
    }

    #[test]
    fn no_username_means_no_credentials() {
        let mut profile = Profile::new("garage.local");
        profile.password = Some("ignored".into());
        let creds = resolve_credentials_with(&profile, "default", |_| None).unwrap();
        assert!(creds.is_none());
    }

    #[test]
    fn password_env_wins_over_shared_env() {
        let mut profile = Profile::new("garage.local");
        profile.username = Some("admin".into());
        profile.password_env = Some("GARAGE_PW".into());
        profile.password = Some("plaintext".into());

        let env = |name: &str| match name {
            "GARAGE_PW" => Some("from-profile-env".to_string()),
            PASSWORD_ENV => Some("from-shared-env".to_string()),
            _ => None,
        };
        let creds = resolve_credentials_with(&profile, "default", env)
            .unwrap()
            .unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose_secret(), "from-profile-env");
    }

    #[test]
    fn shared_env_used_when_profile_env_unset() {
        let mut profile = Profile::new("garage.local");
        profile.password_env = Some("GARAGE_PW".into());

        let env = |name: &str| (name == PASSWORD_ENV).then(|| "shared".to_string());
        let password = resolve_password_with(&profile, "default", env).unwrap();
        assert_eq!(password.expose_secret(), "shared");
    }
}
