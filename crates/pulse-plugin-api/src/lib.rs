//! # Pulse Plugin API
//!
//! Contracts between the Pulse control plane and its collaborators.
//!
//! ## Collaborators
//!
//! - **Plugin clients**: per-instance capabilities used by the dispatcher
//!   ([`CollectorClient`], [`PublisherClient`])
//! - **Plugin supervisor**: starts and stops plugin processes and describes
//!   what they expose ([`PluginSupervisor`])
//! - **Event emitter**: fire-and-forget sink for lifecycle notifications
//!   ([`EventEmitter`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulse_plugin_api::*;
//! use pulse_core::Metric;
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct CpuTemp;
//!
//! #[async_trait]
//! impl CollectorClient for CpuTemp {
//!     async fn collect_metrics(
//!         &self,
//!         requests: &[MetricRequest],
//!     ) -> Result<Vec<Metric>, PluginError> {
//!         Ok(requests
//!             .iter()
//!             .map(|r| Metric::new(r.namespace.clone(), r.version, serde_json::json!(42)))
//!             .collect())
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod client;
pub mod error;
pub mod event;
pub mod supervisor;

#[cfg(feature = "testing")]
pub mod testing;

pub use client::{CollectorClient, MetricRequest, PluginClient, PublisherClient};
pub use error::PluginError;
pub use event::{ControlEvent, EventEmitter};
pub use supervisor::{MetricDeclaration, PluginDescriptor, PluginSupervisor};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::client::{CollectorClient, MetricRequest, PluginClient, PublisherClient};
    pub use crate::error::PluginError;
    pub use crate::event::{ControlEvent, EventEmitter};
    pub use crate::supervisor::{MetricDeclaration, PluginDescriptor, PluginSupervisor};
    pub use async_trait::async_trait;
}
