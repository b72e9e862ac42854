//! Clap derive structures for the `garagelink` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// garagelink -- talk to an ESP8266 garage door controller
#[derive(Debug, Parser)]
#[command(
    name = "garagelink",
    version,
    about = "Monitor and operate a garage door controller from the command line",
    long_about = "Connects to an ESP8266 garage door controller over its websocket,\n\
        keeps the door state in sync and issues open/close commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "GARAGELINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller address or name (overrides profile)
    #[arg(long, short = 'H', env = "GARAGELINK_HOST", global = true)]
    pub host: Option<String>,

    /// Controller websocket port (overrides profile)
    #[arg(long, env = "GARAGELINK_PORT", global = true)]
    pub port: Option<u16>,

    /// Basic-auth username (overrides profile)
    #[arg(long, short = 'u', env = "GARAGELINK_USERNAME", global = true)]
    pub username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "GARAGELINK_PASSWORD", global = true, hide = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Relay pulse length in milliseconds (overrides profile)
    #[arg(long, env = "GARAGELINK_CONTACT_TIME", global = true)]
    pub contact_time: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "GARAGELINK_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Seconds to wait for the controller to connect
    #[arg(long, env = "GARAGELINK_TIMEOUT", default_value = "15", global = true)]
    pub timeout: u64,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Plain,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream door state changes until interrupted
    #[command(alias = "w")]
    Watch,

    /// Print the current door state and exit
    #[command(alias = "st")]
    Status,

    /// Open the door
    Open,

    /// Close the door
    Close,

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the loaded configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a device password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
