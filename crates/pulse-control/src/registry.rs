//! Registry of loaded plugins

use crate::error::{ControlError, Result};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pulse_core::{ConfigPolicyTree, PluginKey, PluginType, LATEST_VERSION};
use pulse_plugin_api::{MetricDeclaration, PluginDescriptor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle status of a registered plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Registered and serving
    Loaded,
    /// Being stopped by the supervisor
    Unloading,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Unloading => write!(f, "unloading"),
        }
    }
}

/// Read-only view of a plugin handed to external callers
pub trait CatalogedPlugin: Send + Sync {
    /// Plugin name
    fn name(&self) -> &str;

    /// Plugin version
    fn version(&self) -> i32;

    /// Plugin type as a lowercase string
    fn type_name(&self) -> String;

    /// Lifecycle status as a lowercase string
    fn status(&self) -> String;

    /// Unix timestamp (seconds) of the load
    fn loaded_timestamp(&self) -> i64;

    /// `name:version` key
    fn key(&self) -> PluginKey {
        PluginKey::new(self.name(), self.version())
    }
}

/// A plugin the supervisor has started and the control plane tracks
#[derive(Debug)]
pub struct LoadedPlugin {
    name: String,
    version: i32,
    plugin_type: PluginType,
    path: PathBuf,
    metrics: Vec<MetricDeclaration>,
    policy: ConfigPolicyTree,
    status: parking_lot::RwLock<PluginStatus>,
    loaded_at: DateTime<Utc>,
}

impl LoadedPlugin {
    /// Build a loaded plugin from a supervisor descriptor
    pub fn from_descriptor(descriptor: PluginDescriptor) -> Self {
        Self {
            name: descriptor.name,
            version: descriptor.version,
            plugin_type: descriptor.plugin_type,
            path: descriptor.path,
            metrics: descriptor.metrics,
            policy: descriptor.policy,
            status: parking_lot::RwLock::new(PluginStatus::Loaded),
            loaded_at: Utc::now(),
        }
    }

    /// Plugin type
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// Path the plugin was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metrics declared at load time
    pub fn metrics(&self) -> &[MetricDeclaration] {
        &self.metrics
    }

    /// Config policy tree declared at load time
    pub fn policy(&self) -> &ConfigPolicyTree {
        &self.policy
    }

    /// When the plugin was loaded
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Current lifecycle status
    pub fn current_status(&self) -> PluginStatus {
        *self.status.read()
    }

    /// Move from `Loaded` to `Unloading`
    ///
    /// Fails if another unload is already in flight.
    pub(crate) fn begin_unload(&self) -> Result<()> {
        let mut status = self.status.write();
        if *status != PluginStatus::Loaded {
            return Err(ControlError::invalid_state(format!(
                "Plugin {} is already unloading",
                self.key()
            )));
        }
        *status = PluginStatus::Unloading;
        Ok(())
    }

    /// Return to `Loaded` after a failed unload
    pub(crate) fn abort_unload(&self) {
        *self.status.write() = PluginStatus::Loaded;
    }

    /// Point-in-time summary
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            version: self.version,
            plugin_type: self.plugin_type,
            status: self.current_status(),
            loaded_at: self.loaded_at,
            metrics: self.metrics.len(),
        }
    }
}

impl CatalogedPlugin for LoadedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn type_name(&self) -> String {
        self.plugin_type.to_string()
    }

    fn status(&self) -> String {
        self.current_status().to_string()
    }

    fn loaded_timestamp(&self) -> i64 {
        self.loaded_at.timestamp()
    }
}

impl CatalogedPlugin for PluginKey {
    fn name(&self) -> &str {
        self.parts().map(|(name, _)| name).unwrap_or(self.as_str())
    }

    fn version(&self) -> i32 {
        self.parts().map(|(_, version)| version).unwrap_or(LATEST_VERSION)
    }

    fn type_name(&self) -> String {
        String::new()
    }

    fn status(&self) -> String {
        String::new()
    }

    fn loaded_timestamp(&self) -> i64 {
        0
    }

    fn key(&self) -> PluginKey {
        self.clone()
    }
}

/// Serializable summary of a loaded plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: i32,
    /// Plugin type
    pub plugin_type: PluginType,
    /// Lifecycle status
    pub status: PluginStatus,
    /// When the plugin was loaded
    pub loaded_at: DateTime<Utc>,
    /// Number of declared metrics
    pub metrics: usize,
}

/// Loaded plugins keyed by `name:version`
#[derive(Clone, Debug, Default)]
pub struct LoadedPlugins {
    plugins: Arc<DashMap<PluginKey, Arc<LoadedPlugin>>>,
}

impl LoadedPlugins {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, refusing a second plugin with the same key
    pub fn insert(&self, plugin: Arc<LoadedPlugin>) -> Result<()> {
        match self.plugins.entry(plugin.key()) {
            Entry::Occupied(entry) => Err(ControlError::AlreadyLoaded(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(plugin = %entry.key(), "Plugin registered");
                entry.insert(plugin);
                Ok(())
            }
        }
    }

    /// Remove a plugin
    pub fn remove(&self, key: &PluginKey) -> Option<Arc<LoadedPlugin>> {
        self.plugins.remove(key).map(|(_, plugin)| plugin)
    }

    /// Look up a plugin by key
    pub fn get_by_key(&self, key: &PluginKey) -> Option<Arc<LoadedPlugin>> {
        self.plugins.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a plugin by name and version; [`LATEST_VERSION`] picks the
    /// highest loaded version of that name
    pub fn get(&self, name: &str, version: i32) -> Option<Arc<LoadedPlugin>> {
        if version != LATEST_VERSION {
            return self.get_by_key(&PluginKey::new(name, version));
        }

        self.plugins
            .iter()
            .filter(|entry| entry.value().name == name)
            .max_by_key(|entry| entry.value().version)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Point-in-time copy of every loaded plugin, ordered by key
    pub fn table(&self) -> Vec<Arc<LoadedPlugin>> {
        let mut plugins: Vec<_> = self
            .plugins
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        plugins.sort_by_key(|p| p.key());
        plugins
    }

    /// Number of loaded plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is loaded
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
