//! Configuration validation

use crate::Config;
use pulse_core::{Error, Result};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_control(config)?;
    validate_plugins(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_control(config: &Config) -> Result<()> {
    let control = &config.control;

    if control.collect_timeout.is_zero() {
        return Err(Error::Config("collect_timeout must be > 0".to_string()));
    }

    if control.publish_timeout.is_zero() {
        return Err(Error::Config("publish_timeout must be > 0".to_string()));
    }

    if control.collect_timeout.as_secs() > 300 {
        tracing::warn!("collect_timeout is very high (>5 minutes)");
    }

    if control.event_capacity == 0 {
        return Err(Error::Config("event_capacity must be > 0".to_string()));
    }

    Ok(())
}

fn validate_plugins(config: &Config) -> Result<()> {
    for path in &config.plugins.autoload {
        if path.as_os_str().is_empty() {
            return Err(Error::Config("autoload path cannot be empty".to_string()));
        }
    }

    if let Some(dir) = &config.plugins.watch_dir {
        if dir.as_os_str().is_empty() {
            return Err(Error::Config("watch_dir cannot be empty".to_string()));
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(Error::Config(format!("Invalid log level: {other}"))),
    }
}
