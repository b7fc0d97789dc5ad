//! Control facade
//!
//! [`Control`] is the single entry point external callers (scheduler,
//! management API) use. It ties the plugin manager, metric catalog,
//! available-plugin pools and dispatcher together, enforces the started
//! state, and emits a [`ControlEvent`] after every successful mutation.

use crate::catalog::{MetricCatalog, MetricType};
use crate::dispatch::Dispatcher;
use crate::error::{ControlError, ErrorKind, Result};
use crate::events::EventBus;
use crate::manager::PluginManager;
use crate::pool::AvailablePlugins;
use crate::registry::{CatalogedPlugin, LoadedPlugin, LoadedPlugins};
use crate::strategy::{strategy_for, RoutingStrategy};
use pulse_config::{ControlSettings, InvariantPolicy};
use pulse_core::{
    ConfigDataNode, ConfigTable, Metric, MetricId, Namespace, PluginKey, PluginType,
};
use pulse_plugin_api::{ControlEvent, EventEmitter, PluginSupervisor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Builder for [`Control`]
#[derive(Debug)]
pub struct ControlBuilder {
    supervisor: Arc<dyn PluginSupervisor>,
    settings: ControlSettings,
    strategy: Option<Arc<dyn RoutingStrategy>>,
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl ControlBuilder {
    /// Start building a control plane around `supervisor`
    pub fn new(supervisor: Arc<dyn PluginSupervisor>) -> Self {
        Self {
            supervisor,
            settings: ControlSettings::default(),
            strategy: None,
            emitters: Vec::new(),
        }
    }

    /// Use these settings
    pub fn settings(mut self, settings: ControlSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the strategy named in the settings
    pub fn strategy(mut self, strategy: Arc<dyn RoutingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Forward every event to `emitter` as well as the built-in bus
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitters.push(emitter);
        self
    }

    /// Build the control plane, in the stopped state
    pub fn build(self) -> Control {
        let strategy = self
            .strategy
            .unwrap_or_else(|| strategy_for(self.settings.routing_strategy));
        let catalog = Arc::new(MetricCatalog::new());
        let available = Arc::new(AvailablePlugins::new());
        let registry = LoadedPlugins::new();
        let manager = PluginManager::new(
            self.supervisor,
            registry.clone(),
            Arc::clone(&catalog),
            Arc::clone(&available),
        );
        let dispatcher = Dispatcher::new(
            registry,
            Arc::clone(&catalog),
            Arc::clone(&available),
            strategy,
            self.settings.publish_timeout,
        );

        Control {
            events: EventBus::new(self.settings.event_capacity),
            settings: self.settings,
            started: AtomicBool::new(false),
            catalog,
            available,
            manager,
            dispatcher,
            emitters: self.emitters,
        }
    }
}

/// The control plane
#[derive(Debug)]
pub struct Control {
    settings: ControlSettings,
    started: AtomicBool,
    catalog: Arc<MetricCatalog>,
    available: Arc<AvailablePlugins>,
    manager: PluginManager,
    dispatcher: Dispatcher,
    events: EventBus,
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl Control {
    /// Build a control plane with default settings
    pub fn new(supervisor: Arc<dyn PluginSupervisor>) -> Self {
        ControlBuilder::new(supervisor).build()
    }

    /// Start building a control plane
    pub fn builder(supervisor: Arc<dyn PluginSupervisor>) -> ControlBuilder {
        ControlBuilder::new(supervisor)
    }

    /// Settings in effect
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Enter the started state
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!(
                strategy = self.dispatcher.strategy().name(),
                "Control started"
            );
        }
    }

    /// Leave the started state; loaded plugins stay registered
    pub fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            info!("Control stopped");
        }
    }

    /// Whether the control plane is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn ensure_started(&self, operation: &'static str) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(ControlError::NotStarted(operation))
        }
    }

    fn emit(&self, event: ControlEvent) {
        for emitter in &self.emitters {
            emitter.emit(event.clone());
        }
        self.events.emit(event);
    }

    /// Event bus carrying every emitted [`ControlEvent`]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load the plugin at `path`
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Arc<LoadedPlugin>> {
        self.ensure_started("load")?;
        let plugin = self.manager.load_plugin(path.as_ref()).await?;

        self.emit(ControlEvent::PluginLoaded {
            name: plugin.name().to_string(),
            version: plugin.version(),
            plugin_type: plugin.plugin_type(),
        });
        Ok(plugin)
    }

    /// Load every path in order, skipping (and logging) the ones that fail
    pub async fn autoload<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<Arc<LoadedPlugin>> {
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load(path).await {
                Ok(plugin) => loaded.push(plugin),
                Err(e) => {
                    warn!(path = %path.as_ref().display(), error = %e, "Autoload skipped plugin");
                }
            }
        }
        loaded
    }

    /// Unload a plugin
    ///
    /// Its metrics leave the catalog, their subscriptions are revoked, and
    /// its pools are emptied.
    pub async fn unload(&self, plugin: &dyn CatalogedPlugin) -> Result<()> {
        self.ensure_started("unload")?;
        let unloaded = self.manager.unload_plugin(&plugin.key()).await?;

        self.emit(ControlEvent::PluginUnloaded {
            name: unloaded.name().to_string(),
            version: unloaded.version(),
            plugin_type: unloaded.plugin_type(),
        });
        Ok(())
    }

    /// Load `path` and unload `outgoing`, rolling the load back if the
    /// unload fails
    ///
    /// When the rollback fails as well the error is a
    /// [`ControlError::RollbackFailure`] carrying both messages.
    pub async fn swap_plugins(
        &self,
        path: impl AsRef<Path>,
        outgoing: &dyn CatalogedPlugin,
    ) -> Result<()> {
        self.ensure_started("swap_plugins")?;
        let (incoming, unloaded) = self
            .manager
            .swap_plugins(path.as_ref(), &outgoing.key())
            .await?;

        self.emit(ControlEvent::PluginsSwapped {
            loaded: incoming.key().to_string(),
            unloaded: unloaded.key().to_string(),
        });
        Ok(())
    }

    /// Subscribe to a metric with user-supplied config
    ///
    /// The config is validated against the metric's policy first; on
    /// success the normalized config is attached and the subscription
    /// counted. A rejected config changes nothing.
    pub async fn subscribe_metric_type(
        &self,
        id: &MetricId,
        config: &ConfigDataNode,
    ) -> Result<Arc<MetricType>> {
        self.ensure_started("subscribe_metric_type")?;
        let metric = self
            .catalog
            .subscribe_with_config(&id.namespace, id.version, config)?;

        self.emit(ControlEvent::MetricSubscribed {
            namespace: metric.namespace().clone(),
            version: metric.version(),
        });
        Ok(metric)
    }

    /// Release a metric subscription
    ///
    /// Releasing a subscription that does not exist is an invariant
    /// violation, handled according to the configured policy.
    pub async fn unsubscribe_metric_type(&self, id: &MetricId) -> Result<()> {
        self.ensure_started("unsubscribe_metric_type")?;
        match self.catalog.unsubscribe(&id.namespace, id.version) {
            Ok(metric) => {
                self.emit(ControlEvent::MetricUnsubscribed {
                    namespace: metric.namespace().clone(),
                });
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::InvariantViolation => {
                error!(metric = %id, error = %e, "Subscription bookkeeping violated");
                if self.settings.invariant_policy == InvariantPolicy::Abort {
                    std::process::abort();
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Subscribe to a publisher with user-supplied config
    ///
    /// The config is validated against the publisher's root policy. Returns
    /// the normalized config.
    pub async fn subscribe_publisher(
        &self,
        name: &str,
        version: i32,
        config: &ConfigTable,
    ) -> Result<ConfigTable> {
        self.ensure_started("subscribe_publisher")?;
        let plugin = self
            .manager
            .registry()
            .get(name, version)
            .ok_or_else(|| ControlError::plugin_not_found(PluginKey::new(name, version)))?;

        if plugin.plugin_type() != PluginType::Publisher {
            return Err(ControlError::InvalidPluginType {
                key: plugin.key(),
                expected: PluginType::Publisher,
                found: plugin.plugin_type(),
            });
        }

        let normalized = plugin
            .policy()
            .root()
            .process(config)
            .map_err(ControlError::Validation)?;

        self.emit(ControlEvent::PublisherSubscribed {
            name: plugin.name().to_string(),
            version: plugin.version(),
        });
        Ok(normalized)
    }

    /// Collect metrics before `deadline`
    ///
    /// Either every requested metric is returned or none is; on failure all
    /// errors are returned.
    pub async fn collect_metrics(
        &self,
        ids: &[MetricId],
        deadline: Instant,
    ) -> std::result::Result<Vec<Metric>, Vec<ControlError>> {
        self.ensure_started("collect_metrics").map_err(|e| vec![e])?;
        self.dispatcher.collect_metrics(ids, deadline).await
    }

    /// Collect metrics within the configured collect timeout
    pub async fn collect(
        &self,
        ids: &[MetricId],
    ) -> std::result::Result<Vec<Metric>, Vec<ControlError>> {
        let deadline = Instant::now() + self.settings.collect_timeout;
        self.collect_metrics(ids, deadline).await
    }

    /// Publish an encoded payload through publisher `name:version`
    pub async fn publish_metrics(
        &self,
        content_type: &str,
        content: &[u8],
        name: &str,
        version: i32,
        config: &ConfigTable,
    ) -> Result<()> {
        self.ensure_started("publish_metrics")?;
        self.dispatcher
            .publish_metrics(content_type, content, &PluginKey::new(name, version), config)
            .await
    }

    /// Point-in-time list of loaded plugins, ordered by key
    pub fn plugin_catalog(&self) -> Vec<Arc<LoadedPlugin>> {
        self.manager.registry().table()
    }

    /// Every metric type in the catalog, ordered by namespace then version
    pub fn metric_catalog(&self) -> Vec<Arc<MetricType>> {
        self.catalog.metrics()
    }

    /// Every version of every metric under `prefix`
    pub fn fetch_metrics(&self, prefix: &Namespace) -> Result<Vec<Arc<MetricType>>> {
        self.catalog.fetch(prefix)
    }

    /// Whether a metric resolves in the catalog
    pub fn metric_exists(&self, namespace: &Namespace, version: i32) -> bool {
        self.catalog.get(namespace, version).is_ok()
    }

    /// The metric catalog
    pub fn catalog(&self) -> &Arc<MetricCatalog> {
        &self.catalog
    }

    /// Running instances, for the supervisor to register with and for
    /// statistics
    pub fn available_plugins(&self) -> &Arc<AvailablePlugins> {
        &self.available
    }
}
