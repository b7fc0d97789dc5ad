//! Plugin lifecycle management

use crate::catalog::MetricCatalog;
use crate::error::{ControlError, Result};
use crate::pool::AvailablePlugins;
use crate::registry::{CatalogedPlugin, LoadedPlugin, LoadedPlugins};
use pulse_core::PluginKey;
use pulse_plugin_api::PluginSupervisor;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Loads and unloads plugins through the supervisor and keeps the registry,
/// metric catalog and instance pools in step with what is running
///
/// A plugin reaches the registry only after the supervisor has started it,
/// and leaves it only after the supervisor has stopped it. A failed load or
/// unload leaves registry and catalog as they were. Lifecycle operations
/// are serialized; collection and publication never wait on them.
#[derive(Clone, Debug)]
pub struct PluginManager {
    supervisor: Arc<dyn PluginSupervisor>,
    registry: LoadedPlugins,
    catalog: Arc<MetricCatalog>,
    available: Arc<AvailablePlugins>,
    lifecycle: Arc<Mutex<()>>,
}

impl PluginManager {
    /// Create a plugin manager
    pub fn new(
        supervisor: Arc<dyn PluginSupervisor>,
        registry: LoadedPlugins,
        catalog: Arc<MetricCatalog>,
        available: Arc<AvailablePlugins>,
    ) -> Self {
        Self {
            supervisor,
            registry,
            catalog,
            available,
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &LoadedPlugins {
        &self.registry
    }

    /// Start the plugin at `path` and register it with its metrics
    pub async fn load_plugin(&self, path: &Path) -> Result<Arc<LoadedPlugin>> {
        let _lifecycle = self.lifecycle.lock().await;
        self.load(path).await
    }

    /// Stop plugin `key` and remove it with its metrics and instances
    ///
    /// Subscriptions on the removed metrics are revoked. Metrics the plugin
    /// held that another loaded plugin also declares pass to that plugin.
    pub async fn unload_plugin(&self, key: &PluginKey) -> Result<Arc<LoadedPlugin>> {
        let _lifecycle = self.lifecycle.lock().await;
        self.unload(key).await
    }

    /// Load `path`, then unload `outgoing`
    ///
    /// If the unload fails the incoming plugin is unloaded again. Returns
    /// the incoming and outgoing plugins.
    pub async fn swap_plugins(
        &self,
        path: &Path,
        outgoing: &PluginKey,
    ) -> Result<(Arc<LoadedPlugin>, Arc<LoadedPlugin>)> {
        let _lifecycle = self.lifecycle.lock().await;
        let incoming = self.load(path).await?;

        match self.unload(outgoing).await {
            Ok(unloaded) => {
                info!(loaded = %incoming.key(), unloaded = %outgoing, "Plugins swapped");
                Ok((incoming, unloaded))
            }
            Err(primary) => {
                warn!(
                    loaded = %incoming.key(),
                    unloaded = %outgoing,
                    error = %primary,
                    "Swap failed, rolling back"
                );
                match self.unload(&incoming.key()).await {
                    Ok(_) => Err(primary),
                    Err(rollback) => {
                        error!(plugin = %incoming.key(), error = %rollback, "Swap rollback failed");
                        Err(ControlError::RollbackFailure {
                            primary: Box::new(primary),
                            rollback: Box::new(rollback),
                        })
                    }
                }
            }
        }
    }

    async fn load(&self, path: &Path) -> Result<Arc<LoadedPlugin>> {
        info!(path = %path.display(), "Loading plugin");

        let descriptor = self.supervisor.load(path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Plugin failed to load");
            ControlError::from(e)
        })?;

        let plugin = Arc::new(LoadedPlugin::from_descriptor(descriptor));
        if let Err(e) = self.registry.insert(Arc::clone(&plugin)) {
            warn!(plugin = %plugin.key(), "Plugin is already loaded");
            return Err(e);
        }

        let metrics = self.catalog.add_loaded_plugin_metrics(&plugin);
        info!(
            plugin = %plugin.key(),
            plugin_type = %plugin.plugin_type(),
            metrics,
            "Plugin loaded"
        );

        Ok(plugin)
    }

    async fn unload(&self, key: &PluginKey) -> Result<Arc<LoadedPlugin>> {
        let plugin = self
            .registry
            .get_by_key(key)
            .ok_or_else(|| ControlError::plugin_not_found(key))?;

        plugin.begin_unload()?;
        info!(plugin = %key, "Unloading plugin");

        if let Err(e) = self.supervisor.unload(key).await {
            plugin.abort_unload();
            error!(plugin = %key, error = %e, "Plugin failed to unload");
            return Err(e.into());
        }

        self.registry.remove(key);
        let revoked = self
            .catalog
            .rm_unloaded_plugin_metrics(&plugin, &self.registry.table());
        if revoked > 0 {
            warn!(plugin = %key, revoked, "Subscriptions revoked by unload");
        }

        let drained = self.available.drain(key);
        debug!(plugin = %key, drained, "Instance pools emptied");

        info!(plugin = %key, "Plugin unloaded");
        Ok(plugin)
    }
}
