//! CLI argument definitions for rattle-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// rattle container log scanner daemon.
///
/// Follows the output of every running container, classifies each line
/// against the configured pattern rules and forwards matched events to
/// the notification targets.
#[derive(Parser, Debug)]
#[command(name = "rattle-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to rattle.toml configuration file.
    ///
    /// A missing file is not an error; built-in defaults are used instead.
    #[arg(short, long, default_value = "/etc/rattle/rattle.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
