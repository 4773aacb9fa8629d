//! Tracing subscriber setup.
//!
//! Logs always go to stderr: stdout belongs to command output, and to the
//! JSON-RPC stream when running as an MCP server. The `RULES_LOG`
//! environment variable takes an `EnvFilter` directive and overrides
//! `[logging].level`.

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "RULES_LOG";

pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    check_level(&config.level)?;
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));
    let registry = Registry::default().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn check_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        other => bail!(
            "Invalid log level '{}'. Must be trace, debug, info, warn, error, or off.",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_level() {
        assert!(check_level("info").is_ok());
        assert!(check_level("WARN").is_ok());
        assert!(check_level("verbose").is_err());
    }
}
