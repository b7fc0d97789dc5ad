//! Control plane error types

use pulse_core::{Namespace, PluginKey, PluginType, PolicyError};
use pulse_plugin_api::PluginError;
use std::fmt;

/// Coarse classification of a [`ControlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A metric or plugin does not exist
    NotFound,
    /// User-supplied config was rejected by a policy
    Validation,
    /// No pool, or no healthy instance, could serve the call
    ResourceUnavailable,
    /// A plugin instance failed or timed out
    RemoteInvocation,
    /// Internal bookkeeping was about to break an invariant
    InvariantViolation,
    /// A swap failed and so did its rollback
    RollbackFailure,
    /// The call is not allowed in the current state
    InvalidState,
    /// A collaborator (supervisor, watcher) reported an error
    Collaborator,
}

/// Control plane error type
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Metric not in the catalog
    #[error("Metric not found: {namespace} (version {version})")]
    MetricNotFound {
        /// Requested namespace
        namespace: Namespace,
        /// Requested version
        version: i32,
    },

    /// Plugin not loaded
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// A plugin with the same key is already loaded
    #[error("Plugin already loaded: {0}")]
    AlreadyLoaded(PluginKey),

    /// Plugin exists but is of the wrong type for the call
    #[error("Plugin {key} is a {found}, expected a {expected}")]
    InvalidPluginType {
        /// Plugin key
        key: PluginKey,
        /// Type the call needs
        expected: PluginType,
        /// Type of the plugin
        found: PluginType,
    },

    /// Config rejected by a policy; every violation is listed
    #[error("Config validation failed: {}", join_policy_errors(.0))]
    Validation(Vec<PolicyError>),

    /// No pool or healthy instance available
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A plugin instance returned an error
    #[error("Remote invocation on {plugin} failed: {source}")]
    RemoteInvocation {
        /// Plugin key
        plugin: PluginKey,
        /// Error reported by the instance
        #[source]
        source: PluginError,
    },

    /// A plugin instance did not answer before the deadline
    #[error("Call to {plugin} timed out")]
    Timeout {
        /// Plugin key
        plugin: PluginKey,
    },

    /// Internal invariant violated
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Swap failed and the rollback failed too
    #[error("failed to rollback after error: {rollback} -- {primary}")]
    RollbackFailure {
        /// Error that triggered the rollback
        primary: Box<ControlError>,
        /// Error raised by the rollback
        rollback: Box<ControlError>,
    },

    /// Control has not been started
    #[error("Control must be started before calling {0}")]
    NotStarted(&'static str),

    /// Call not allowed in the plugin's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error surfaced verbatim from the plugin supervisor
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Plugin directory watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),
}

/// Result type for control plane operations
pub type Result<T> = std::result::Result<T, ControlError>;

fn join_policy_errors(errors: &[PolicyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ControlError {
    /// Create a new metric not found error
    pub fn metric_not_found(namespace: &Namespace, version: i32) -> Self {
        Self::MetricNotFound {
            namespace: namespace.clone(),
            version,
        }
    }

    /// Create a new plugin not found error
    pub fn plugin_not_found(name: impl fmt::Display) -> Self {
        Self::PluginNotFound(name.to_string())
    }

    /// Create a new resource unavailable error
    pub fn unavailable(msg: impl fmt::Display) -> Self {
        Self::ResourceUnavailable(msg.to_string())
    }

    /// Create a new invariant violation
    pub fn invariant(msg: impl fmt::Display) -> Self {
        Self::InvariantViolation(msg.to_string())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl fmt::Display) -> Self {
        Self::InvalidState(msg.to_string())
    }

    /// Create a new watcher error
    pub fn watcher(msg: impl fmt::Display) -> Self {
        Self::Watcher(msg.to_string())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MetricNotFound { .. } | Self::PluginNotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Self::RemoteInvocation { .. } | Self::Timeout { .. } => ErrorKind::RemoteInvocation,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::RollbackFailure { .. } => ErrorKind::RollbackFailure,
            Self::NotStarted(_)
            | Self::InvalidState(_)
            | Self::AlreadyLoaded(_)
            | Self::InvalidPluginType { .. } => ErrorKind::InvalidState,
            Self::Plugin(_) | Self::Watcher(_) => ErrorKind::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = ControlError::metric_not_found(&Namespace::from(["cpu", "temp"]), 2);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Metric not found: /cpu/temp (version 2)");

        let err = ControlError::Timeout {
            plugin: PluginKey::new("tempcol", 1),
        };
        assert_eq!(err.kind(), ErrorKind::RemoteInvocation);

        assert_eq!(
            ControlError::NotStarted("load").kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_validation_lists_every_violation() {
        let err = ControlError::Validation(vec![
            PolicyError::MissingRequired {
                key: "unit".to_string(),
            },
            PolicyError::MissingRequired {
                key: "host".to_string(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("unit"));
        assert!(msg.contains("host"));
    }

    #[test]
    fn test_rollback_failure_carries_both_messages() {
        let err = ControlError::RollbackFailure {
            primary: Box::new(ControlError::plugin_not_found("old:1")),
            rollback: Box::new(ControlError::Plugin(PluginError::stop_failed("stuck"))),
        };
        assert_eq!(
            err.to_string(),
            "failed to rollback after error: Plugin error: Plugin failed to stop: stuck -- Plugin not found: old:1"
        );
        assert_eq!(err.kind(), ErrorKind::RollbackFailure);
    }
}
