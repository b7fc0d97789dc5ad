//! Metric catalog
//!
//! Versioned registry of every metric type the loaded collectors expose,
//! keyed by namespace and then by version. Each entry records its owning
//! plugin, the config policy that applies to it, the config attached by the
//! latest successful subscription, and a subscription counter that never
//! goes below zero.

use crate::error::{ControlError, Result};
use crate::registry::{CatalogedPlugin, LoadedPlugin};
use parking_lot::RwLock;
use pulse_core::{ConfigDataNode, ConfigPolicyNode, ConfigTable, Namespace, LATEST_VERSION};
use pulse_plugin_api::{MetricDeclaration, MetricRequest};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One version of a metric
#[derive(Debug)]
pub struct MetricType {
    namespace: Namespace,
    version: i32,
    plugin: Option<Arc<LoadedPlugin>>,
    policy: ConfigPolicyNode,
    config: RwLock<Option<ConfigTable>>,
    subscriptions: AtomicU64,
}

impl MetricType {
    /// Create a metric type with no owner
    pub fn new(namespace: impl Into<Namespace>, version: i32, policy: ConfigPolicyNode) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            plugin: None,
            policy,
            config: RwLock::new(None),
            subscriptions: AtomicU64::new(0),
        }
    }

    /// Create a metric type owned by a loaded plugin
    ///
    /// The policy is the plugin's policy tree resolved at the namespace.
    pub fn from_declaration(plugin: &Arc<LoadedPlugin>, declaration: &MetricDeclaration) -> Self {
        let policy = plugin.policy().get(declaration.namespace.segments());
        Self {
            plugin: Some(Arc::clone(plugin)),
            ..Self::new(declaration.namespace.clone(), declaration.version, policy)
        }
    }

    /// Metric namespace
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Metric version
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Owning plugin, if any
    pub fn plugin(&self) -> Option<&Arc<LoadedPlugin>> {
        self.plugin.as_ref()
    }

    /// Config policy applied to subscriptions
    pub fn policy(&self) -> &ConfigPolicyNode {
        &self.policy
    }

    /// Config attached by the latest successful subscription
    pub fn config(&self) -> Option<ConfigTable> {
        self.config.read().clone()
    }

    /// Current number of subscriptions
    pub fn subscriptions(&self) -> u64 {
        self.subscriptions.load(Ordering::Acquire)
    }

    /// Request sent to the owning collector for this metric
    pub fn request(&self) -> MetricRequest {
        MetricRequest {
            namespace: self.namespace.clone(),
            version: self.version,
            config: self.config().unwrap_or_default(),
        }
    }

    fn owned_by(&self, plugin: &LoadedPlugin) -> bool {
        self.plugin
            .as_ref()
            .is_some_and(|owner| owner.key() == plugin.key())
    }

    fn increment(&self) -> u64 {
        self.subscriptions.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn decrement(&self) -> Result<u64> {
        self.subscriptions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|previous| previous - 1)
            .map_err(|_| {
                ControlError::invariant(format!(
                    "subscription count for {} v{} would drop below zero",
                    self.namespace, self.version
                ))
            })
    }

    /// Validate `config` against the policy, then attach it and count the
    /// subscription. Nothing changes when validation fails.
    fn subscribe_with(&self, config: &ConfigDataNode) -> Result<ConfigTable> {
        let normalized = self
            .policy
            .process(config.table())
            .map_err(ControlError::Validation)?;

        let mut attached = self.config.write();
        *attached = Some(normalized.clone());
        self.increment();
        Ok(normalized)
    }
}

/// Every version of one namespace, as returned by [`MetricCatalog::snapshot`]
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Namespace rendered as `/a/b`
    pub key: String,
    /// Versions in ascending order
    pub versions: Vec<Arc<MetricType>>,
}

type VersionTable = BTreeMap<i32, Arc<MetricType>>;

/// Insert the declarations of `plugin` that no other plugin owns yet
fn insert_declarations(
    table: &mut BTreeMap<Namespace, VersionTable>,
    plugin: &Arc<LoadedPlugin>,
) -> usize {
    let mut added = 0;

    for declaration in plugin.metrics() {
        let versions = table.entry(declaration.namespace.clone()).or_default();
        if let Some(existing) = versions.get(&declaration.version) {
            if !existing.owned_by(plugin) {
                debug!(
                    namespace = %declaration.namespace,
                    version = declaration.version,
                    plugin = %plugin.key(),
                    "Metric already provided by another plugin"
                );
            }
            continue;
        }
        versions.insert(
            declaration.version,
            Arc::new(MetricType::from_declaration(plugin, declaration)),
        );
        added += 1;
    }

    added
}

/// Versioned metric registry
#[derive(Debug, Default)]
pub struct MetricCatalog {
    table: RwLock<BTreeMap<Namespace, VersionTable>>,
}

impl MetricCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric type, replacing any entry with the same namespace and version
    pub fn add(&self, metric: MetricType) -> Arc<MetricType> {
        let metric = Arc::new(metric);
        let replaced = self
            .table
            .write()
            .entry(metric.namespace.clone())
            .or_default()
            .insert(metric.version, Arc::clone(&metric));

        if replaced.is_some() {
            debug!(namespace = %metric.namespace, version = metric.version, "Metric type replaced");
        }
        metric
    }

    /// Add every metric a loaded plugin declares
    ///
    /// Entries already owned by another plugin are left alone. Returns the
    /// number of entries added.
    pub fn add_loaded_plugin_metrics(&self, plugin: &Arc<LoadedPlugin>) -> usize {
        insert_declarations(&mut self.table.write(), plugin)
    }

    /// Remove every entry owned by `plugin`, then offer the declarations of
    /// `remaining` plugins in its place
    ///
    /// Both steps run under one write lock, so a metric another plugin also
    /// declares never disappears from view. Returns the number of
    /// subscriptions revoked along with the removed entries.
    pub fn rm_unloaded_plugin_metrics(
        &self,
        plugin: &LoadedPlugin,
        remaining: &[Arc<LoadedPlugin>],
    ) -> u64 {
        let mut table = self.table.write();
        let mut revoked = 0;

        table.retain(|namespace, versions| {
            versions.retain(|version, metric| {
                if !metric.owned_by(plugin) {
                    return true;
                }
                let subscriptions = metric.subscriptions();
                if subscriptions > 0 {
                    warn!(
                        namespace = %namespace,
                        version = *version,
                        subscriptions,
                        plugin = %plugin.key(),
                        "Revoking subscriptions of unloaded plugin"
                    );
                }
                revoked += subscriptions;
                false
            });
            !versions.is_empty()
        });

        for successor in remaining {
            let taken = insert_declarations(&mut table, successor);
            if taken > 0 {
                debug!(plugin = %successor.key(), metrics = taken, "Metrics handed over");
            }
        }

        revoked
    }

    /// Resolve a metric; [`LATEST_VERSION`] selects the highest version
    pub fn get(&self, namespace: &Namespace, version: i32) -> Result<Arc<MetricType>> {
        let table = self.table.read();
        let versions = table
            .get(namespace)
            .ok_or_else(|| ControlError::metric_not_found(namespace, version))?;

        let metric = if version == LATEST_VERSION {
            versions.values().next_back()
        } else {
            versions.get(&version)
        };

        metric
            .cloned()
            .ok_or_else(|| ControlError::metric_not_found(namespace, version))
    }

    /// Every version of every metric under `prefix`
    ///
    /// The root prefix matches everything and never fails.
    pub fn fetch(&self, prefix: &Namespace) -> Result<Vec<Arc<MetricType>>> {
        let table = self.table.read();
        let metrics: Vec<_> = table
            .range(prefix.clone()..)
            .take_while(|(namespace, _)| namespace.starts_with(prefix))
            .flat_map(|(_, versions)| versions.values().cloned())
            .collect();

        if metrics.is_empty() && !prefix.is_empty() {
            return Err(ControlError::metric_not_found(prefix, LATEST_VERSION));
        }
        Ok(metrics)
    }

    /// Resolve a metric together with its owning plugin
    pub fn resolve(
        &self,
        namespace: &Namespace,
        version: i32,
    ) -> Result<(Arc<MetricType>, Arc<LoadedPlugin>)> {
        let metric = self.get(namespace, version)?;
        let plugin = metric.plugin().cloned().ok_or_else(|| {
            ControlError::plugin_not_found(format!(
                "no plugin owns {} v{}",
                namespace, metric.version
            ))
        })?;
        Ok((metric, plugin))
    }

    /// Owning plugin of a metric
    pub fn get_plugin(&self, namespace: &Namespace, version: i32) -> Result<Arc<LoadedPlugin>> {
        self.resolve(namespace, version).map(|(_, plugin)| plugin)
    }

    /// Count a subscription without attaching config
    pub fn subscribe(&self, namespace: &Namespace, version: i32) -> Result<Arc<MetricType>> {
        let metric = self.get(namespace, version)?;
        metric.increment();
        Ok(metric)
    }

    /// Validate `config` against the metric's policy, then attach the
    /// normalized config and count the subscription
    pub fn subscribe_with_config(
        &self,
        namespace: &Namespace,
        version: i32,
        config: &ConfigDataNode,
    ) -> Result<Arc<MetricType>> {
        let metric = self.get(namespace, version)?;
        metric.subscribe_with(config)?;
        Ok(metric)
    }

    /// Release a subscription
    ///
    /// Fails with an invariant violation, leaving the count at zero, when
    /// the metric has no subscription to release.
    pub fn unsubscribe(&self, namespace: &Namespace, version: i32) -> Result<Arc<MetricType>> {
        let metric = self.get(namespace, version)?;
        metric.decrement()?;
        Ok(metric)
    }

    /// Point-in-time listing of the catalog, ordered by namespace
    pub fn snapshot(&self) -> Vec<CatalogEntry> {
        self.table
            .read()
            .iter()
            .map(|(namespace, versions)| CatalogEntry {
                key: namespace.to_string(),
                versions: versions.values().cloned().collect(),
            })
            .collect()
    }

    /// Every metric type, ordered by namespace then version
    pub fn metrics(&self) -> Vec<Arc<MetricType>> {
        self.table
            .read()
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect()
    }

    /// Number of metric types
    pub fn len(&self) -> usize {
        self.table.read().values().map(BTreeMap::len).sum()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}
