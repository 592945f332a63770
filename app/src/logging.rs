//! Environment-driven logging setup.
//!
//! - `BC_LOG_FORMAT`: `compact` (default) or `json`
//! - `BC_LOG_LEVEL`: filter directive, default `warn`; `RUST_LOG` wins when set
//!
//! Logs always go to stderr; stdout is reserved for generated documents.

use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGING_CONFIG: OnceLock<LoggingConfig> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let format = match var("BC_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };
        let level = var("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| var("BC_LOG_LEVEL"))
            .unwrap_or_else(|| "warn".to_string());
        Self { format, level }
    }
}

/// Initialize the global subscriber. Calling it twice is an error.
pub fn init_logging() -> Result<()> {
    let config = LoggingConfig::from_env();
    LOGGING_CONFIG
        .set(config.clone())
        .map_err(|_| anyhow::anyhow!("logging already initialized"))?;

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
    }

    tracing::debug!(format = ?config.format, level = %config.level, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> LoggingConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LoggingConfig::from_vars(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_to_compact_warn() {
        let c = config(&[]);
        assert_eq!(c.format, LogFormat::Compact);
        assert_eq!(c.level, "warn");
    }

    #[test]
    fn rust_log_wins_over_bc_level() {
        let c = config(&[("BC_LOG_LEVEL", "debug"), ("RUST_LOG", "bc_config=trace")]);
        assert_eq!(c.level, "bc_config=trace");
        let c = config(&[("BC_LOG_LEVEL", "debug"), ("BC_LOG_FORMAT", "json")]);
        assert_eq!(c.level, "debug");
        assert_eq!(c.format, LogFormat::Json);
    }
}
