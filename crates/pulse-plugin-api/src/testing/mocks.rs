//! Mock implementations for testing

use crate::client::{CollectorClient, MetricRequest, PublisherClient};
use crate::event::{ControlEvent, EventEmitter};
use crate::supervisor::{PluginDescriptor, PluginSupervisor};
use crate::PluginError;
use async_trait::async_trait;
use pulse_core::{ConfigTable, Metric, PluginKey};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock supervisor serving descriptors registered by path
#[derive(Debug, Clone, Default)]
pub struct MockSupervisor {
    plugins: Arc<Mutex<HashMap<PathBuf, PluginDescriptor>>>,
    load_failures: Arc<Mutex<HashMap<PathBuf, String>>>,
    unload_failures: Arc<Mutex<HashMap<PluginKey, String>>>,
    running: Arc<Mutex<Vec<PluginKey>>>,
    unload_calls: Arc<Mutex<Vec<PluginKey>>>,
}

impl MockSupervisor {
    /// Create a supervisor that knows no plugins
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a plugin loadable from its descriptor's path
    pub fn with_plugin(self, descriptor: PluginDescriptor) -> Self {
        self.plugins
            .lock()
            .unwrap()
            .insert(descriptor.path.clone(), descriptor);
        self
    }

    /// Make loading `path` fail
    pub fn fail_load(&self, path: impl Into<PathBuf>, message: impl Into<String>) {
        self.load_failures
            .lock()
            .unwrap()
            .insert(path.into(), message.into());
    }

    /// Make unloading `key` fail until cleared
    pub fn fail_unload(&self, key: PluginKey, message: impl Into<String>) {
        self.unload_failures
            .lock()
            .unwrap()
            .insert(key, message.into());
    }

    /// Let unloading `key` succeed again
    pub fn clear_unload_failure(&self, key: &PluginKey) {
        self.unload_failures.lock().unwrap().remove(key);
    }

    /// Keys of plugin processes currently running
    pub fn running(&self) -> Vec<PluginKey> {
        self.running.lock().unwrap().clone()
    }

    /// Every key passed to `unload`, in call order
    pub fn unload_calls(&self) -> Vec<PluginKey> {
        self.unload_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginSupervisor for MockSupervisor {
    async fn load(&self, path: &Path) -> Result<PluginDescriptor, PluginError> {
        if let Some(message) = self.load_failures.lock().unwrap().get(path) {
            return Err(PluginError::start_failed(message));
        }

        let descriptor = self
            .plugins
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::invalid_path(path.display()))?;

        self.running.lock().unwrap().push(descriptor.key());
        Ok(descriptor)
    }

    async fn unload(&self, key: &PluginKey) -> Result<(), PluginError> {
        self.unload_calls.lock().unwrap().push(key.clone());

        if let Some(message) = self.unload_failures.lock().unwrap().get(key) {
            return Err(PluginError::stop_failed(message));
        }

        let mut running = self.running.lock().unwrap();
        if let Some(pos) = running.iter().position(|k| k == key) {
            running.remove(pos);
        }
        Ok(())
    }
}

/// Mock collector answering every request with one metric
#[derive(Debug, Clone)]
pub struct MockCollector {
    name: String,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockCollector {
    /// Create a collector whose metrics carry `{"source": name}`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of collect calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectorClient for MockCollector {
    async fn collect_metrics(&self, requests: &[MetricRequest]) -> Result<Vec<Metric>, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(PluginError::call(message));
        }

        Ok(requests
            .iter()
            .map(|r| {
                Metric::new(
                    r.namespace.clone(),
                    r.version,
                    serde_json::json!({ "source": self.name }),
                )
            })
            .collect())
    }
}

/// A payload received by [`MockPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Content type tag
    pub content_type: String,
    /// Raw payload
    pub content: Vec<u8>,
    /// Config passed along
    pub config: ConfigTable,
}

/// Mock publisher recording every payload
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<Published>>>,
    failure: Option<String>,
}

impl MockPublisher {
    /// Create a publisher that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Payloads received so far
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublisherClient for MockPublisher {
    async fn publish(
        &self,
        content_type: &str,
        content: &[u8],
        config: &ConfigTable,
    ) -> Result<(), PluginError> {
        if let Some(message) = &self.failure {
            return Err(PluginError::call(message));
        }
        self.published.lock().unwrap().push(Published {
            content_type: content_type.to_string(),
            content: content.to_vec(),
            config: config.clone(),
        });
        Ok(())
    }
}

/// Event emitter keeping every event in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<ControlEvent>>>,
}

impl RecordingEmitter {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted so far
    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: ControlEvent) {
        self.events.lock().unwrap().push(event);
    }
}
