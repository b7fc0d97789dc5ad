//! Configuration loading

use crate::{Config, ConfigFormat};
use pulse_core::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::Path;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let value = read_value(path.as_ref())?;
    into_config(value)
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match (env::var(var_name), default_value) {
            (Ok(val), _) => val,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                return Err(Error::Config(format!(
                    "Environment variable '{var_name}' not set and no default provided"
                )));
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

/// Parse a configuration document into an untyped value
fn parse_value(content: &str, format: ConfigFormat) -> Result<serde_json::Value> {
    let expanded = expand_env_vars(content)?;

    let value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(value)
}

fn read_value(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {e}", path.display())))?;
    let format = ConfigFormat::from_path(path)?;
    parse_value(&content, format)
}

fn into_config(value: serde_json::Value) -> Result<Config> {
    // An empty YAML document parses to null
    let value = if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    into_config(parse_value(content, format)?)
}

/// Load and validate configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}

/// Load and merge multiple configuration files
///
/// Files are merged in order, with later files overriding earlier ones.
/// Maps merge key by key; any other value is replaced wholesale.
///
/// # Example
///
/// ```no_run
/// use pulse_config::load_and_merge;
///
/// let config = load_and_merge(&[
///     "/etc/pulse/base.yaml",
///     "/etc/pulse/production.yaml",
/// ])?;
/// # Ok::<(), pulse_core::Error>(())
/// ```
pub fn load_and_merge<P: AsRef<Path>>(paths: &[P]) -> Result<Config> {
    if paths.is_empty() {
        return Err(Error::Config("No configuration files provided".to_string()));
    }

    let values = paths
        .iter()
        .map(|p| read_value(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let merged = crate::merger::merge_values(values)?;
    let config = into_config(merged)?;
    crate::validator::validate_config(&config)?;

    tracing::debug!(files = paths.len(), "Merged configuration files");

    Ok(config)
}
