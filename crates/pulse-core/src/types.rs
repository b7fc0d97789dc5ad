//! Common types used throughout Pulse

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version selector meaning "the highest registered version"
pub const LATEST_VERSION: i32 = -1;

/// Ordered sequence of segments identifying a metric, e.g. `cpu/temp`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// Create a namespace from its segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty namespace, prefix of every other namespace
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Namespace segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root namespace
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether `prefix` is a leading run of segments of this namespace
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// All prefixes from the root down to (and including) this namespace
    pub fn prefixes(&self) -> impl Iterator<Item = &[String]> + '_ {
        (0..=self.0.len()).map(move |n| &self.0[..n])
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<String> = s
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(String::from)
            .collect();
        if segments.is_empty() {
            return Err(Error::InvalidNamespace(s.to_string()));
        }
        Ok(Self(segments))
    }
}

impl From<&[&str]> for Namespace {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Namespace {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

/// Identifier of a requested metric: namespace plus version selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    /// Metric namespace
    pub namespace: Namespace,

    /// Metric version, [`LATEST_VERSION`] for the newest
    #[serde(default = "latest_version")]
    pub version: i32,
}

fn latest_version() -> i32 {
    LATEST_VERSION
}

impl MetricId {
    /// Create an identifier pinned to a version
    pub fn new(namespace: impl Into<Namespace>, version: i32) -> Self {
        Self {
            namespace: namespace.into(),
            version,
        }
    }

    /// Create an identifier resolving to the newest version
    pub fn latest(namespace: impl Into<Namespace>) -> Self {
        Self::new(namespace, LATEST_VERSION)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == LATEST_VERSION {
            write!(f, "{} (latest)", self.namespace)
        } else {
            write!(f, "{} v{}", self.namespace, self.version)
        }
    }
}

/// A collected metric value as returned by a collector plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric namespace
    pub namespace: Namespace,

    /// Version of the metric type that produced the value
    pub version: i32,

    /// Collected data
    pub data: serde_json::Value,

    /// When the value was collected
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    /// Create a metric stamped with the current time
    pub fn new(namespace: impl Into<Namespace>, version: i32, data: serde_json::Value) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Stable `name:version` identity of a loaded plugin and its pools
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginKey(String);

impl PluginKey {
    /// Build a key from a plugin name and version
    pub fn new(name: &str, version: i32) -> Self {
        Self(format!("{name}:{version}"))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into name and version
    pub fn parts(&self) -> Result<(&str, i32)> {
        let (name, version) = self
            .0
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidPluginKey(self.0.clone()))?;
        let version = version
            .parse()
            .map_err(|_| Error::InvalidPluginKey(self.0.clone()))?;
        Ok((name, version))
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PluginKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = Self(s.to_string());
        key.parts()?;
        Ok(key)
    }
}

/// Kind of plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Produces metrics on request
    Collector,
    /// Transforms metrics
    Processor,
    /// Sends metrics to an external sink
    Publisher,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collector => write!(f, "collector"),
            Self::Processor => write!(f, "processor"),
            Self::Publisher => write!(f, "publisher"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_parse_and_display() {
        let ns: Namespace = "/cpu/temp".parse().unwrap();
        assert_eq!(ns, Namespace::from(["cpu", "temp"]));
        assert_eq!(ns.to_string(), "/cpu/temp");
        assert!("/".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_namespace_prefixes() {
        let ns = Namespace::from(["intel", "cpu", "temp"]);
        let prefixes: Vec<_> = ns.prefixes().map(|p| p.len()).collect();
        assert_eq!(prefixes, vec![0, 1, 2, 3]);
        assert!(ns.starts_with(&Namespace::from(["intel"])));
        assert!(ns.starts_with(&Namespace::root()));
        assert!(!ns.starts_with(&Namespace::from(["cpu"])));
    }

    #[test]
    fn test_plugin_key() {
        let key = PluginKey::new("tempcol", 2);
        assert_eq!(key.as_str(), "tempcol:2");
        assert_eq!(key.parts().unwrap(), ("tempcol", 2));

        assert!("tempcol".parse::<PluginKey>().is_err());
        assert!("tempcol:x".parse::<PluginKey>().is_err());
    }

    #[test]
    fn test_plugin_type_serialization() {
        let json = serde_json::to_string(&PluginType::Publisher).unwrap();
        assert_eq!(json, "\"publisher\"");
        assert_eq!(PluginType::Collector.to_string(), "collector");
    }

    #[test]
    fn test_metric_id_defaults_to_latest() {
        let id: MetricId = serde_json::from_str(r#"{"namespace":["cpu","temp"]}"#).unwrap();
        assert_eq!(id.version, LATEST_VERSION);
        assert_eq!(id.to_string(), "/cpu/temp (latest)");
    }
}
