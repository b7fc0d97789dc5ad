//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Control plane settings
    #[serde(default)]
    pub control: ControlSettings,

    /// Plugins to load at start-up
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control plane settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlSettings {
    /// Policy used to pick an instance from a pool
    #[serde(default)]
    pub routing_strategy: RoutingStrategyKind,

    /// Deadline applied to a collection when the caller gives none
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub collect_timeout: Duration,

    /// Bound on a single publish call
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub publish_timeout: Duration,

    /// What to do when catalog bookkeeping detects an invariant violation
    #[serde(default)]
    pub invariant_policy: InvariantPolicy,

    /// Buffer size of the event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategyKind::default(),
            collect_timeout: default_timeout(),
            publish_timeout: default_timeout(),
            invariant_policy: InvariantPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_event_capacity() -> usize {
    256
}

/// Instance selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategyKind {
    /// Rotate through healthy instances
    #[default]
    RoundRobin,
    /// Pick the healthy instance with the fewest hits
    LeastHits,
}

/// Handling of invariant violations (subscription count driven negative)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Log and return the error to the caller
    #[default]
    Propagate,
    /// Log and abort the process
    Abort,
}

/// Plugins loaded by the control plane
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Plugin paths loaded at start-up
    #[serde(default)]
    pub autoload: Vec<PathBuf>,

    /// Directory watched for new plugin files
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}
