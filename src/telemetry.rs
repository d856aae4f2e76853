//! Logging setup for applications embedding the SDK

use std::str::FromStr;

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("Unknown log format '{}' (expected json or pretty)", other)),
        }
    }
}

/// Install a global `tracing` subscriber
///
/// `level` is an env-filter directive such as `info` or `dlhub_sdk=debug`.
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(level);

    match format {
        LogFormat::Pretty => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e)),
        LogFormat::Json => builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e)),
    }
}
