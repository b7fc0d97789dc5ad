//! # Pulse Core
//!
//! Core types shared by every crate of the Pulse telemetry control plane:
//! - Metric and plugin identity types
//! - Config data tables and trees
//! - Config policies used to validate user-supplied configuration
//! - The crate-wide error type

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod cdata;
pub mod error;
pub mod policy;
pub mod types;

pub use cdata::{ConfigDataNode, ConfigDataTree, ConfigTable, ConfigValue};
pub use error::{Error, Result};
pub use policy::{ConfigPolicyNode, ConfigPolicyTree, PolicyError, Rule, RuleKind};
pub use types::{Metric, MetricId, Namespace, PluginKey, PluginType, LATEST_VERSION};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cdata::{ConfigDataNode, ConfigDataTree, ConfigTable, ConfigValue};
    pub use crate::error::{Error, Result};
    pub use crate::policy::{ConfigPolicyNode, ConfigPolicyTree, PolicyError, Rule, RuleKind};
    pub use crate::types::{Metric, MetricId, Namespace, PluginKey, PluginType, LATEST_VERSION};
}
