//! Collection and publication routing
//!
//! A collection batch is grouped by owning plugin, each group is sent to
//! one instance picked from that plugin's pool, and the groups run
//! concurrently under a shared deadline. Outcomes come back over a channel
//! tagged with their plugin key. The batch is fail-closed: any group error
//! discards every metric and returns all errors.

use crate::catalog::MetricCatalog;
use crate::error::{ControlError, Result};
use crate::pool::{AvailablePlugin, AvailablePlugins};
use crate::registry::{CatalogedPlugin, LoadedPlugins};
use crate::strategy::RoutingStrategy;
use pulse_core::{ConfigTable, Metric, MetricId, PluginKey, PluginType};
use pulse_plugin_api::{MetricRequest, PluginError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Result of one plugin group, tagged with its key
#[derive(Debug)]
struct GroupOutcome {
    key: PluginKey,
    result: Result<Vec<Metric>>,
}

/// Routes collection and publication calls to plugin instances
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: LoadedPlugins,
    catalog: Arc<MetricCatalog>,
    available: Arc<AvailablePlugins>,
    strategy: Arc<dyn RoutingStrategy>,
    publish_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        registry: LoadedPlugins,
        catalog: Arc<MetricCatalog>,
        available: Arc<AvailablePlugins>,
        strategy: Arc<dyn RoutingStrategy>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            catalog,
            available,
            strategy,
            publish_timeout,
        }
    }

    /// Strategy used to pick instances
    pub fn strategy(&self) -> &Arc<dyn RoutingStrategy> {
        &self.strategy
    }

    /// Group requested metrics by owning plugin
    ///
    /// Any metric missing from the catalog fails the whole batch before
    /// anything is dispatched.
    fn group_by_plugin(&self, ids: &[MetricId]) -> Result<BTreeMap<PluginKey, Vec<MetricRequest>>> {
        let mut groups: BTreeMap<PluginKey, Vec<MetricRequest>> = BTreeMap::new();
        for id in ids {
            let (metric, plugin) = self.catalog.resolve(&id.namespace, id.version)?;
            groups
                .entry(plugin.key())
                .or_default()
                .push(metric.request());
        }
        Ok(groups)
    }

    /// Pick an instance of a loaded plugin and count the hit
    ///
    /// Pools of keys missing from the registry are never routed to.
    fn select(&self, plugin_type: PluginType, key: &PluginKey) -> Result<Arc<AvailablePlugin>> {
        if self.registry.get_by_key(key).is_none() {
            return Err(ControlError::unavailable(format!("{key} is not loaded")));
        }
        let pool = self
            .available
            .get_plugin_pool(plugin_type, key)
            .ok_or_else(|| ControlError::unavailable(format!("no {plugin_type} pool for {key}")))?;
        let instance = pool.select(self.strategy.as_ref())?;
        instance.record_hit();
        Ok(instance)
    }

    /// Collect `ids` from their owning collectors before `deadline`
    pub async fn collect_metrics(
        &self,
        ids: &[MetricId],
        deadline: Instant,
    ) -> std::result::Result<Vec<Metric>, Vec<ControlError>> {
        let groups = self.group_by_plugin(ids).map_err(|e| vec![e])?;

        let mut errors = Vec::new();
        let mut pending = BTreeSet::new();
        let (tx, mut rx) = mpsc::channel::<GroupOutcome>(groups.len().max(1));

        for (key, requests) in groups {
            let instance = match self.select(PluginType::Collector, &key) {
                Ok(instance) => instance,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let Some(client) = instance.client().as_collector().cloned() else {
                errors.push(ControlError::InvalidPluginType {
                    key,
                    expected: PluginType::Collector,
                    found: instance.plugin_type(),
                });
                continue;
            };

            debug!(
                plugin = %key,
                instance = instance.id(),
                metrics = requests.len(),
                "Dispatching collection"
            );

            pending.insert(key.clone());
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = match timeout_at(deadline, client.collect_metrics(&requests)).await {
                    Ok(Ok(metrics)) => Ok(metrics),
                    Ok(Err(source)) => Err(ControlError::RemoteInvocation {
                        plugin: key.clone(),
                        source,
                    }),
                    Err(_) => Err(ControlError::Timeout {
                        plugin: key.clone(),
                    }),
                };
                let _ = tx.send(GroupOutcome { key, result }).await;
            });
        }
        drop(tx);

        let mut metrics = Vec::new();
        while let Some(outcome) = rx.recv().await {
            pending.remove(&outcome.key);
            match outcome.result {
                Ok(mut collected) => metrics.append(&mut collected),
                Err(e) => {
                    warn!(plugin = %outcome.key, error = %e, "Collection failed");
                    errors.push(e);
                }
            }
        }

        // A task that panicked drops its sender without reporting
        for key in pending {
            errors.push(ControlError::RemoteInvocation {
                source: PluginError::call(format!("collection task for {key} ended without reporting")),
                plugin: key,
            });
        }

        if errors.is_empty() {
            Ok(metrics)
        } else {
            Err(errors)
        }
    }

    /// Publish an encoded payload to one instance of publisher `name:version`
    pub async fn publish_metrics(
        &self,
        content_type: &str,
        content: &[u8],
        key: &PluginKey,
        config: &ConfigTable,
    ) -> Result<()> {
        let instance = self.select(PluginType::Publisher, key)?;
        let client = instance
            .client()
            .as_publisher()
            .ok_or_else(|| ControlError::InvalidPluginType {
                key: key.clone(),
                expected: PluginType::Publisher,
                found: instance.plugin_type(),
            })?;

        debug!(plugin = %key, instance = instance.id(), bytes = content.len(), "Dispatching publish");

        match timeout(self.publish_timeout, client.publish(content_type, content, config)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ControlError::RemoteInvocation {
                plugin: key.clone(),
                source,
            }),
            Err(_) => Err(ControlError::Timeout {
                plugin: key.clone(),
            }),
        }
    }
}
