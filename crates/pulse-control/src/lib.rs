//! # Pulse Control
//!
//! Control plane of the Pulse telemetry framework.
//!
//! ## Components
//!
//! - **Plugin manager**: loads and unloads plugins through a
//!   [`PluginSupervisor`](pulse_plugin_api::PluginSupervisor) and keeps the
//!   registry of [`LoadedPlugin`]s
//! - **Metric catalog**: versioned registry of the metric types loaded
//!   collectors expose, with per-metric config policy and subscription counts
//! - **Available plugins**: pools of running instances per plugin key
//! - **Routing strategies**: pick one healthy instance from a pool
//! - **Dispatcher**: fans a collection batch out to its owning collectors
//!   under a deadline, and routes publish calls
//! - **Control**: the facade tying it all together
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulse_control::prelude::*;
//! use pulse_core::{ConfigDataNode, MetricId};
//! use std::sync::Arc;
//! # use pulse_plugin_api::PluginSupervisor;
//!
//! # async fn example(supervisor: Arc<dyn PluginSupervisor>) -> Result<(), ControlError> {
//! let control = Control::new(supervisor);
//! control.start();
//!
//! control.load("/opt/pulse/plugins/collector-cpu").await?;
//!
//! let id = MetricId::latest(["cpu", "temp"]);
//! control.subscribe_metric_type(&id, &ConfigDataNode::new()).await?;
//!
//! match control.collect(&[id]).await {
//!     Ok(metrics) => println!("collected {} metrics", metrics.len()),
//!     Err(errors) => eprintln!("collection failed: {errors:?}"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod autoload;
pub mod catalog;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod strategy;

pub use autoload::{is_plugin_candidate, AutoloadWatcher};
pub use catalog::{CatalogEntry, MetricCatalog, MetricType};
pub use control::{Control, ControlBuilder};
pub use dispatch::Dispatcher;
pub use error::{ControlError, ErrorKind, Result};
pub use events::EventBus;
pub use manager::PluginManager;
pub use pool::{
    AvailablePlugin, AvailablePluginPool, AvailablePlugins, InstanceStats, PluginPoolIndex,
};
pub use registry::{CatalogedPlugin, LoadedPlugin, LoadedPlugins, PluginStatus, PluginSummary};
pub use strategy::{strategy_for, LeastHitsStrategy, RoundRobinStrategy, RoutingStrategy};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::control::{Control, ControlBuilder};
    pub use crate::error::{ControlError, ErrorKind};
    pub use crate::pool::AvailablePlugins;
    pub use crate::registry::{CatalogedPlugin, LoadedPlugin};
    pub use crate::strategy::{LeastHitsStrategy, RoundRobinStrategy, RoutingStrategy};
}
