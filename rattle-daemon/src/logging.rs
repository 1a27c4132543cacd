//! Tracing setup for rattle-daemon.
//!
//! Called from `main` once the configuration has been loaded, overridden by
//! the command line and validated, so the level and format are known-good.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Client crates that are noisy below `warn`. Docker log follows and watcher
/// polls would otherwise emit a connection line every few seconds.
const QUIET_TARGETS: [&str; 5] = ["bollard", "hyper", "hyper_util", "sqlx", "reqwest"];

/// Output format of the daemon's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, event fields flattened to the top level.
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl LogFormat {
    /// Map a validated `general.log_format` value.
    pub fn from_name(name: &str) -> Self {
        if name == "pretty" {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Filter directives for `level`: rattle crates at `level`, client crates at `warn`.
fn directives(level: &str) -> String {
    let mut directives = vec![level.to_owned()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the directives.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_quiet_client_crates() {
        let d = directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("bollard=warn"));
        assert!(d.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }

    #[test]
    fn format_from_validated_name() {
        assert_eq!(LogFormat::from_name("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_name("json"), LogFormat::Json);
    }
}
