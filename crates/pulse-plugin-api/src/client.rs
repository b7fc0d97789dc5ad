//! Capabilities of a running plugin instance

use crate::error::Result;
use async_trait::async_trait;
use pulse_core::{ConfigTable, Metric, Namespace, PluginType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One metric a collector is asked for, with its resolved version and the
/// configuration attached by the latest successful subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    /// Metric namespace
    pub namespace: Namespace,

    /// Concrete metric version (never "latest")
    pub version: i32,

    /// Normalized subscription config, empty when never subscribed
    #[serde(default)]
    pub config: ConfigTable,
}

/// Client for a running collector instance
#[async_trait]
pub trait CollectorClient: Send + Sync + fmt::Debug {
    /// Collect the requested metrics
    async fn collect_metrics(&self, requests: &[MetricRequest]) -> Result<Vec<Metric>>;
}

/// Client for a running publisher instance
#[async_trait]
pub trait PublisherClient: Send + Sync + fmt::Debug {
    /// Publish an encoded payload
    async fn publish(&self, content_type: &str, content: &[u8], config: &ConfigTable) -> Result<()>;
}

/// RPC capability reachable from an available plugin instance
#[derive(Debug, Clone)]
pub enum PluginClient {
    /// Collector capability
    Collector(Arc<dyn CollectorClient>),

    /// Publisher capability
    Publisher(Arc<dyn PublisherClient>),
}

impl PluginClient {
    /// Plugin type this client serves
    pub fn plugin_type(&self) -> PluginType {
        match self {
            PluginClient::Collector(_) => PluginType::Collector,
            PluginClient::Publisher(_) => PluginType::Publisher,
        }
    }

    /// Collector capability, if this is a collector client
    pub fn as_collector(&self) -> Option<&Arc<dyn CollectorClient>> {
        match self {
            PluginClient::Collector(c) => Some(c),
            PluginClient::Publisher(_) => None,
        }
    }

    /// Publisher capability, if this is a publisher client
    pub fn as_publisher(&self) -> Option<&Arc<dyn PublisherClient>> {
        match self {
            PluginClient::Publisher(p) => Some(p),
            PluginClient::Collector(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Sink;

    #[async_trait]
    impl PublisherClient for Sink {
        async fn publish(&self, _: &str, _: &[u8], _: &ConfigTable) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_client_capabilities() {
        let client = PluginClient::Publisher(Arc::new(Sink));
        assert_eq!(client.plugin_type(), PluginType::Publisher);
        assert!(client.as_publisher().is_some());
        assert!(client.as_collector().is_none());
    }
}
