//! Available plugin pools
//!
//! Running plugin instances grouped by plugin key, one index per plugin
//! type. Instances are registered and deregistered by the plugin
//! supervisor; the dispatcher only reads pools and records hits.

use crate::error::{ControlError, Result};
use crate::strategy::RoutingStrategy;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use pulse_core::{PluginKey, PluginType};
use pulse_plugin_api::PluginClient;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A running plugin instance
#[derive(Debug)]
pub struct AvailablePlugin {
    id: u64,
    key: PluginKey,
    client: PluginClient,
    healthy: AtomicBool,
    hit_count: AtomicU64,
    last_hit: Mutex<Option<DateTime<Utc>>>,
    registered_at: DateTime<Utc>,
}

impl AvailablePlugin {
    fn new(id: u64, key: PluginKey, client: PluginClient) -> Self {
        Self {
            id,
            key,
            client,
            healthy: AtomicBool::new(true),
            hit_count: AtomicU64::new(0),
            last_hit: Mutex::new(None),
            registered_at: Utc::now(),
        }
    }

    /// Instance id, unique within an [`AvailablePlugins`] set
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key of the plugin this instance runs
    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    /// Plugin type served by the instance
    pub fn plugin_type(&self) -> PluginType {
        self.client.plugin_type()
    }

    /// RPC capability
    pub fn client(&self) -> &PluginClient {
        &self.client
    }

    /// Whether the instance may be selected
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Mark the instance healthy or unhealthy
    pub fn set_healthy(&self, healthy: bool) {
        if self.healthy.swap(healthy, Ordering::AcqRel) != healthy {
            info!(plugin = %self.key, id = self.id, healthy, "Instance health changed");
        }
    }

    /// Number of calls routed to the instance
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    /// Time of the latest routed call
    pub fn last_hit(&self) -> Option<DateTime<Utc>> {
        *self.last_hit.lock()
    }

    /// Count a routed call
    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        *self.last_hit.lock() = Some(Utc::now());
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> InstanceStats {
        InstanceStats {
            id: self.id,
            key: self.key.clone(),
            plugin_type: self.plugin_type(),
            healthy: self.is_healthy(),
            hit_count: self.hit_count(),
            last_hit: self.last_hit(),
            registered_at: self.registered_at,
        }
    }
}

/// Statistics of one instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStats {
    /// Instance id
    pub id: u64,
    /// Plugin key
    pub key: PluginKey,
    /// Plugin type
    pub plugin_type: PluginType,
    /// Health flag
    pub healthy: bool,
    /// Routed calls
    pub hit_count: u64,
    /// Latest routed call
    pub last_hit: Option<DateTime<Utc>>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

/// Instances of one plugin key
#[derive(Debug)]
pub struct AvailablePluginPool {
    key: PluginKey,
    instances: RwLock<Vec<Arc<AvailablePlugin>>>,
    cursor: AtomicUsize,
}

impl AvailablePluginPool {
    fn new(key: PluginKey) -> Self {
        Self {
            key,
            instances: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Plugin key the pool serves
    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    /// Number of instances, healthy or not
    pub fn count(&self) -> usize {
        self.instances.read().len()
    }

    /// Every instance in registration order
    pub fn instances(&self) -> Vec<Arc<AvailablePlugin>> {
        self.instances.read().clone()
    }

    /// Healthy instances in registration order
    pub fn healthy(&self) -> Vec<Arc<AvailablePlugin>> {
        self.instances
            .read()
            .iter()
            .filter(|instance| instance.is_healthy())
            .cloned()
            .collect()
    }

    /// Advance the pool's rotation cursor, returning its previous position
    pub fn advance_cursor(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }

    /// Pick an instance with `strategy`
    pub fn select(&self, strategy: &dyn RoutingStrategy) -> Result<Arc<AvailablePlugin>> {
        strategy.select(self)
    }

    fn insert(&self, instance: Arc<AvailablePlugin>) {
        self.instances.write().push(instance);
    }

    fn remove(&self, id: u64) -> Option<Arc<AvailablePlugin>> {
        let mut instances = self.instances.write();
        let pos = instances.iter().position(|instance| instance.id == id)?;
        Some(instances.remove(pos))
    }

    fn drain(&self) -> Vec<Arc<AvailablePlugin>> {
        std::mem::take(&mut *self.instances.write())
    }
}

/// Pools of one plugin type, keyed by plugin key
///
/// A pool emptied by deregistration stays in the index, so "no pool for
/// this key" and "pool with no instances" remain distinguishable.
#[derive(Debug)]
pub struct PluginPoolIndex {
    plugin_type: PluginType,
    pools: DashMap<PluginKey, Arc<AvailablePluginPool>>,
}

impl PluginPoolIndex {
    fn new(plugin_type: PluginType) -> Self {
        Self {
            plugin_type,
            pools: DashMap::new(),
        }
    }

    /// Plugin type served by the index
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// Pool for `key`, if one was ever created
    pub fn get_plugin_pool(&self, key: &PluginKey) -> Option<Arc<AvailablePluginPool>> {
        self.pools.get(key).map(|pool| Arc::clone(pool.value()))
    }

    /// Keys with a pool, ordered
    pub fn keys(&self) -> Vec<PluginKey> {
        let mut keys: Vec<_> = self.pools.iter().map(|pool| pool.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Every instance of every pool
    pub fn instances(&self) -> Vec<Arc<AvailablePlugin>> {
        self.pools
            .iter()
            .flat_map(|pool| pool.value().instances())
            .collect()
    }

    fn insert(&self, instance: Arc<AvailablePlugin>) {
        let pool = self
            .pools
            .entry(instance.key.clone())
            .or_insert_with(|| Arc::new(AvailablePluginPool::new(instance.key.clone())))
            .value()
            .clone();
        pool.insert(instance);
    }

    fn remove(&self, key: &PluginKey, id: u64) -> Option<Arc<AvailablePlugin>> {
        self.get_plugin_pool(key)?.remove(id)
    }

    fn drain(&self, key: &PluginKey) -> usize {
        self.get_plugin_pool(key).map_or(0, |pool| pool.drain().len())
    }
}

/// Every running collector and publisher instance
#[derive(Debug)]
pub struct AvailablePlugins {
    /// Collector pools
    pub collectors: PluginPoolIndex,
    /// Publisher pools
    pub publishers: PluginPoolIndex,
    next_id: AtomicU64,
}

impl Default for AvailablePlugins {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailablePlugins {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            collectors: PluginPoolIndex::new(PluginType::Collector),
            publishers: PluginPoolIndex::new(PluginType::Publisher),
            next_id: AtomicU64::new(1),
        }
    }

    fn index(&self, plugin_type: PluginType) -> Result<&PluginPoolIndex> {
        match plugin_type {
            PluginType::Collector => Ok(&self.collectors),
            PluginType::Publisher => Ok(&self.publishers),
            PluginType::Processor => Err(ControlError::invalid_state(
                "processor instances cannot be routed to",
            )),
        }
    }

    /// Register a running instance of plugin `key`
    pub fn register(&self, key: PluginKey, client: PluginClient) -> Result<Arc<AvailablePlugin>> {
        let index = self.index(client.plugin_type())?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let instance = Arc::new(AvailablePlugin::new(id, key, client));
        index.insert(Arc::clone(&instance));

        debug!(plugin = %instance.key, id, plugin_type = %instance.plugin_type(), "Instance registered");
        Ok(instance)
    }

    /// Deregister one instance; its pool is kept even when emptied
    pub fn deregister(&self, key: &PluginKey, id: u64) -> Option<Arc<AvailablePlugin>> {
        let removed = self
            .collectors
            .remove(key, id)
            .or_else(|| self.publishers.remove(key, id));
        if removed.is_some() {
            debug!(plugin = %key, id, "Instance deregistered");
        }
        removed
    }

    /// Remove every instance of `key` from both indexes
    pub fn drain(&self, key: &PluginKey) -> usize {
        let drained = self.collectors.drain(key) + self.publishers.drain(key);
        if drained > 0 {
            debug!(plugin = %key, drained, "Instances drained");
        }
        drained
    }

    /// Pool serving `key` for the given plugin type
    pub fn get_plugin_pool(
        &self,
        plugin_type: PluginType,
        key: &PluginKey,
    ) -> Option<Arc<AvailablePluginPool>> {
        self.index(plugin_type).ok()?.get_plugin_pool(key)
    }

    /// Statistics of every instance, ordered by id
    pub fn stats(&self) -> Vec<InstanceStats> {
        let mut stats: Vec<_> = self
            .collectors
            .instances()
            .iter()
            .chain(self.publishers.instances().iter())
            .map(|instance| instance.stats())
            .collect();
        stats.sort_by_key(|s| s.id);
        stats
    }
}
