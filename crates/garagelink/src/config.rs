//! CLI configuration -- thin wrapper around `garagelink_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--host, --port, --username, --password, --contact-time).

use secrecy::SecretString;

use garagelink_core::{BridgeConfig, Credentials};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use garagelink_config::{
    Config, Profile, config_path, keyring_entry, load_config, load_config_or_default, save_config,
};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `BridgeConfig` from the config file, profile, and CLI overrides.
pub fn build_bridge_config(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let base = match (cfg.profiles.get(&profile_name), &global.host) {
        (Some(profile), _) => profile.clone(),
        // No profile -- build from CLI flags / env vars alone
        (None, Some(host)) if global.profile.is_none() => Profile::new(host.clone()),
        (None, _) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: cfg.profile_names(),
            });
        }
        (None, _) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let profile = apply_overrides(base, global);

    let bridge = match (&global.password, &profile.username) {
        (Some(password), Some(username)) => {
            let credentials = Credentials {
                username: username.clone(),
                password: SecretString::from(password.clone()),
            };
            garagelink_config::bridge_config_with_credentials(
                &profile,
                &cfg.defaults,
                Some(credentials),
            )?
        }
        _ => garagelink_config::profile_to_bridge_config(&profile, &profile_name, &cfg.defaults)?,
    };
    tracing::debug!(
        profile = %profile_name,
        host = %bridge.host,
        port = bridge.port,
        "resolved bridge config"
    );
    Ok(bridge)
}

/// CLI flags take priority over profile values.
fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if let Some(contact_time) = global.contact_time {
        profile.contact_time = Some(contact_time);
    }
    profile
}
