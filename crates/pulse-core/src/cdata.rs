//! User-supplied configuration data
//!
//! A [`ConfigDataNode`] is a flat table of values. A [`ConfigDataTree`]
//! attaches nodes to namespace prefixes so that configuration given for
//! `/intel` applies to every metric under it, while configuration given for
//! `/intel/cpu/temp` overrides it for that one metric.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
}

impl ConfigValue {
    /// Name of the value's type, used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "string",
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

/// Flat key/value configuration table
pub type ConfigTable = BTreeMap<String, ConfigValue>;

/// A node of configuration data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDataNode {
    table: ConfigTable,
}

impl ConfigDataNode {
    /// Create an empty node
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node from an existing table
    pub fn from_table(table: ConfigTable) -> Self {
        Self { table }
    }

    /// Add (or replace) a value
    pub fn add_item(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.table.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`add_item`](Self::add_item)
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.add_item(key, value);
        self
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.table.get(key)
    }

    /// Borrow the underlying table
    pub fn table(&self) -> &ConfigTable {
        &self.table
    }

    /// Overlay `other` on top of this node; values in `other` win
    pub fn merge(&mut self, other: &ConfigDataNode) {
        for (key, value) in &other.table {
            self.table.insert(key.clone(), value.clone());
        }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the node holds no values
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Configuration data attached to namespace prefixes
#[derive(Debug, Clone, Default)]
pub struct ConfigDataTree {
    nodes: BTreeMap<Vec<String>, ConfigDataNode>,
}

impl ConfigDataTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node at a namespace prefix, merging with any node already there
    pub fn add(&mut self, prefix: &[String], node: ConfigDataNode) {
        self.nodes
            .entry(prefix.to_vec())
            .and_modify(|existing| existing.merge(&node))
            .or_insert(node);
    }

    /// Effective configuration for a namespace
    ///
    /// Nodes on the path from the root to `namespace` are merged in order,
    /// deeper nodes winning. Returns `None` when no node lies on the path.
    pub fn get(&self, namespace: &[String]) -> Option<ConfigDataNode> {
        let mut merged: Option<ConfigDataNode> = None;
        for depth in 0..=namespace.len() {
            if let Some(node) = self.nodes.get(&namespace[..depth]) {
                merged.get_or_insert_with(ConfigDataNode::new).merge(node);
            }
        }
        merged
    }
}
