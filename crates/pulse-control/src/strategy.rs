//! Instance selection strategies

use crate::error::{ControlError, Result};
use crate::pool::{AvailablePlugin, AvailablePluginPool};
use pulse_config::RoutingStrategyKind;
use std::fmt;
use std::sync::Arc;

/// Picks one instance from a pool
///
/// Implementations must only return healthy instances and must fail with
/// [`ControlError::ResourceUnavailable`] when there is none.
pub trait RoutingStrategy: Send + Sync + fmt::Debug {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Select an instance
    fn select(&self, pool: &AvailablePluginPool) -> Result<Arc<AvailablePlugin>>;
}

fn healthy_or_unavailable(pool: &AvailablePluginPool) -> Result<Vec<Arc<AvailablePlugin>>> {
    let healthy = pool.healthy();
    if healthy.is_empty() {
        return Err(ControlError::unavailable(format!(
            "no healthy instance of {} ({} registered)",
            pool.key(),
            pool.count()
        )));
    }
    Ok(healthy)
}

/// Rotate through healthy instances
///
/// Over any `n` consecutive selections on a pool with `n` healthy
/// instances and no membership change, each instance is picked once.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinStrategy;

impl RoutingStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&self, pool: &AvailablePluginPool) -> Result<Arc<AvailablePlugin>> {
        let healthy = healthy_or_unavailable(pool)?;
        let idx = pool.advance_cursor() % healthy.len();
        Ok(Arc::clone(&healthy[idx]))
    }
}

/// Pick the healthy instance with the fewest hits
///
/// Ties go to the first instance in rotation order, so equally loaded
/// instances are still visited in turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastHitsStrategy;

impl RoutingStrategy for LeastHitsStrategy {
    fn name(&self) -> &'static str {
        "least_hits"
    }

    fn select(&self, pool: &AvailablePluginPool) -> Result<Arc<AvailablePlugin>> {
        let healthy = healthy_or_unavailable(pool)?;
        let start = pool.advance_cursor() % healthy.len();

        let picked = (0..healthy.len())
            .map(|offset| &healthy[(start + offset) % healthy.len()])
            .min_by_key(|instance| instance.hit_count())
            .unwrap_or(&healthy[start]);
        Ok(Arc::clone(picked))
    }
}

/// Build the strategy named in configuration
pub fn strategy_for(kind: RoutingStrategyKind) -> Arc<dyn RoutingStrategy> {
    match kind {
        RoutingStrategyKind::RoundRobin => Arc::new(RoundRobinStrategy),
        RoutingStrategyKind::LeastHits => Arc::new(LeastHitsStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::AvailablePlugins;
    use async_trait::async_trait;
    use pulse_core::{Metric, PluginKey};
    use pulse_plugin_api::{CollectorClient, MetricRequest, PluginClient, PluginError};
    use std::collections::HashMap;

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl CollectorClient for Noop {
        async fn collect_metrics(
            &self,
            _: &[MetricRequest],
        ) -> std::result::Result<Vec<Metric>, PluginError> {
            Ok(Vec::new())
        }
    }

    fn pool_with(n: usize) -> (AvailablePlugins, Arc<AvailablePluginPool>) {
        let available = AvailablePlugins::new();
        let key = PluginKey::new("tempcol", 1);
        for _ in 0..n {
            available
                .register(key.clone(), PluginClient::Collector(Arc::new(Noop)))
                .unwrap();
        }
        let pool = available.collectors.get_plugin_pool(&key).unwrap();
        (available, pool)
    }

    #[test]
    fn test_round_robin_visits_each_instance_once() {
        let (_available, pool) = pool_with(3);
        pool.advance_cursor();

        let mut seen = HashMap::new();
        for _ in 0..3 {
            let instance = RoundRobinStrategy.select(&pool).unwrap();
            *seen.entry(instance.id()).or_insert(0) += 1;
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.values().all(|&n| n == 1));
    }

    #[test]
    fn test_unhealthy_instances_are_skipped() {
        let (_available, pool) = pool_with(2);
        let instances = pool.instances();
        instances[0].set_healthy(false);

        for _ in 0..4 {
            let picked = RoundRobinStrategy.select(&pool).unwrap();
            assert_eq!(picked.id(), instances[1].id());
        }

        instances[1].set_healthy(false);
        let err = RoundRobinStrategy.select(&pool).unwrap_err();
        assert!(matches!(err, ControlError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_empty_pool_is_unavailable() {
        let (available, pool) = pool_with(1);
        let id = pool.instances()[0].id();
        available.deregister(pool.key(), id).unwrap();

        assert!(LeastHitsStrategy.select(&pool).is_err());
        assert!(RoundRobinStrategy.select(&pool).is_err());
    }

    #[test]
    fn test_least_hits_prefers_idle_instance() {
        let (_available, pool) = pool_with(3);
        let instances = pool.instances();
        instances[0].record_hit();
        instances[0].record_hit();
        instances[2].record_hit();

        let picked = LeastHitsStrategy.select(&pool).unwrap();
        assert_eq!(picked.id(), instances[1].id());
    }

    #[test]
    fn test_strategy_for_kind() {
        assert_eq!(strategy_for(RoutingStrategyKind::RoundRobin).name(), "round_robin");
        assert_eq!(strategy_for(RoutingStrategyKind::LeastHits).name(), "least_hits");
    }
}
