//! Control plane notifications

use pulse_core::{Namespace, PluginType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification emitted after a successful mutating call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A plugin was loaded
    PluginLoaded {
        /// Plugin name
        name: String,
        /// Plugin version
        version: i32,
        /// Plugin type
        plugin_type: PluginType,
    },

    /// A plugin was unloaded
    PluginUnloaded {
        /// Plugin name
        name: String,
        /// Plugin version
        version: i32,
        /// Plugin type
        plugin_type: PluginType,
    },

    /// One plugin replaced another
    PluginsSwapped {
        /// Key of the plugin that came in
        loaded: String,
        /// Key of the plugin that went out
        unloaded: String,
    },

    /// A metric subscription was accepted
    MetricSubscribed {
        /// Metric namespace
        namespace: Namespace,
        /// Resolved metric version
        version: i32,
    },

    /// A metric subscription was released
    MetricUnsubscribed {
        /// Metric namespace
        namespace: Namespace,
    },

    /// A publisher subscription was accepted
    PublisherSubscribed {
        /// Plugin name
        name: String,
        /// Plugin version
        version: i32,
    },
}

/// Fire-and-forget sink for [`ControlEvent`]s
///
/// `emit` must not block and must not fail the caller.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event
    fn emit(&self, event: ControlEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ControlEvent::PublisherSubscribed {
            name: "file".to_string(),
            version: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "publisher_subscribed");
        assert_eq!(json["name"], "file");
    }
}
