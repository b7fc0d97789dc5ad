//! Plugin process supervisor contract

use crate::error::Result;
use async_trait::async_trait;
use pulse_core::{ConfigPolicyTree, Namespace, PluginKey, PluginType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A metric a plugin declares during its handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDeclaration {
    /// Metric namespace
    pub namespace: Namespace,

    /// Metric version
    pub version: i32,
}

impl MetricDeclaration {
    /// Create a declaration
    pub fn new(namespace: impl Into<Namespace>, version: i32) -> Self {
        Self {
            namespace: namespace.into(),
            version,
        }
    }
}

/// Description of a plugin the supervisor has started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin name
    pub name: String,

    /// Plugin version
    pub version: i32,

    /// Plugin type
    pub plugin_type: PluginType,

    /// Path the plugin was loaded from
    pub path: PathBuf,

    /// Metrics the plugin exposes (collectors only)
    #[serde(default)]
    pub metrics: Vec<MetricDeclaration>,

    /// Config policy for the plugin itself (root) and per metric prefix
    #[serde(default)]
    pub policy: ConfigPolicyTree,
}

impl PluginDescriptor {
    /// Create a descriptor with no metrics and an empty policy
    pub fn new(
        name: impl Into<String>,
        version: i32,
        plugin_type: PluginType,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            plugin_type,
            path: path.into(),
            metrics: Vec::new(),
            policy: ConfigPolicyTree::new(),
        }
    }

    /// Add a declared metric
    pub fn with_metric(mut self, namespace: impl Into<Namespace>, version: i32) -> Self {
        self.metrics.push(MetricDeclaration::new(namespace, version));
        self
    }

    /// Set the plugin's policy tree
    pub fn with_policy(mut self, policy: ConfigPolicyTree) -> Self {
        self.policy = policy;
        self
    }

    /// `name:version` key
    pub fn key(&self) -> PluginKey {
        PluginKey::new(&self.name, self.version)
    }
}

/// Starts, stops and describes plugin processes
///
/// Implementations also register running instances with the control
/// plane's available-plugin pools as they come up and go away.
#[async_trait]
pub trait PluginSupervisor: Send + Sync + fmt::Debug {
    /// Start the plugin at `path` and return its description
    async fn load(&self, path: &Path) -> Result<PluginDescriptor>;

    /// Stop the plugin identified by `key`
    async fn unload(&self, key: &PluginKey) -> Result<()>;
}
