//! Config policies
//!
//! Plugins declare rules for the configuration they accept. Before a
//! subscription is accepted the user's [`ConfigTable`] is run through the
//! effective [`ConfigPolicyNode`]: types and bounds are checked, defaults are
//! filled in and every missing required key is reported. Processing is
//! all-or-nothing, either a normalized table or the full error list.

use crate::cdata::{ConfigTable, ConfigValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Expected type of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// String value
    String,
    /// Integer value
    Integer,
    /// Float value (integers are widened)
    Float,
    /// Boolean value
    Bool,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::String => write!(f, "string"),
            RuleKind::Integer => write!(f, "integer"),
            RuleKind::Float => write!(f, "float"),
            RuleKind::Bool => write!(f, "bool"),
        }
    }
}

/// A single policy violation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// Required key missing and no default declared
    #[error("required key missing ({key})")]
    MissingRequired {
        /// Config key
        key: String,
    },

    /// Value has the wrong type
    #[error("type mismatch ({key} wanted type '{expected}' but provided type '{found}')")]
    TypeMismatch {
        /// Config key
        key: String,
        /// Type the rule expects
        expected: RuleKind,
        /// Type that was supplied
        found: &'static str,
    },

    /// Numeric value below the declared minimum
    #[error("{key} value {value} is below minimum {min}")]
    BelowMinimum {
        /// Config key
        key: String,
        /// Supplied value
        value: f64,
        /// Declared minimum
        min: f64,
    },

    /// Numeric value above the declared maximum
    #[error("{key} value {value} is above maximum {max}")]
    AboveMaximum {
        /// Config key
        key: String,
        /// Supplied value
        value: f64,
        /// Declared maximum
        max: f64,
    },
}

/// Validation and defaulting rule for one config key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Config key
    pub key: String,

    /// Expected type
    pub kind: RuleKind,

    /// Whether the key must be present (after defaults)
    #[serde(default)]
    pub required: bool,

    /// Default value used when the key is absent
    #[serde(default)]
    pub default: Option<ConfigValue>,

    /// Inclusive minimum for numeric rules
    #[serde(default)]
    pub min: Option<f64>,

    /// Inclusive maximum for numeric rules
    #[serde(default)]
    pub max: Option<f64>,
}

impl Rule {
    fn new(key: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
        }
    }

    /// String rule
    pub fn string(key: impl Into<String>) -> Self {
        Self::new(key, RuleKind::String)
    }

    /// Integer rule
    pub fn integer(key: impl Into<String>) -> Self {
        Self::new(key, RuleKind::Integer)
    }

    /// Float rule
    pub fn float(key: impl Into<String>) -> Self {
        Self::new(key, RuleKind::Float)
    }

    /// Bool rule
    pub fn bool(key: impl Into<String>) -> Self {
        Self::new(key, RuleKind::Bool)
    }

    /// Mark the key as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a default value
    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set a minimum for numeric rules
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set a maximum for numeric rules
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Validate one value against this rule
    ///
    /// Returns the value to store (`None` when the key stays absent).
    pub fn validate(&self, value: Option<&ConfigValue>) -> Result<Option<ConfigValue>, PolicyError> {
        let Some(value) = value else {
            if let Some(default) = &self.default {
                return Ok(Some(default.clone()));
            }
            if self.required {
                return Err(PolicyError::MissingRequired {
                    key: self.key.clone(),
                });
            }
            return Ok(None);
        };

        let value = match (self.kind, value) {
            (RuleKind::String, ConfigValue::Str(_))
            | (RuleKind::Integer, ConfigValue::Int(_))
            | (RuleKind::Float, ConfigValue::Float(_))
            | (RuleKind::Bool, ConfigValue::Bool(_)) => value.clone(),
            (RuleKind::Float, ConfigValue::Int(i)) => ConfigValue::Float(*i as f64),
            (expected, found) => {
                return Err(PolicyError::TypeMismatch {
                    key: self.key.clone(),
                    expected,
                    found: found.type_name(),
                })
            }
        };

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    return Err(PolicyError::BelowMinimum {
                        key: self.key.clone(),
                        value: n,
                        min,
                    });
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    return Err(PolicyError::AboveMaximum {
                        key: self.key.clone(),
                        value: n,
                        max,
                    });
                }
            }
        }

        Ok(Some(value))
    }
}

/// Set of rules applying to one namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPolicyNode {
    rules: BTreeMap<String, Rule>,
}

impl ConfigPolicyNode {
    /// Create an empty policy node (accepts anything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, replacing any rule for the same key
    pub fn add(&mut self, rule: Rule) {
        self.rules.insert(rule.key.clone(), rule);
    }

    /// Builder-style variant of [`add`](Self::add)
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add(rule);
        self
    }

    /// Rules declared on this node
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Overlay the rules of `other`; rules in `other` win
    pub fn merge(&mut self, other: &ConfigPolicyNode) {
        for rule in other.rules.values() {
            self.add(rule.clone());
        }
    }

    /// Validate and normalize a config table
    ///
    /// Keys without a rule are passed through untouched.
    pub fn process(&self, table: &ConfigTable) -> Result<ConfigTable, Vec<PolicyError>> {
        let mut normalized = table.clone();
        let mut errors = Vec::new();

        for rule in self.rules.values() {
            match rule.validate(table.get(&rule.key)) {
                Ok(Some(value)) => {
                    normalized.insert(rule.key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(normalized)
        } else {
            tracing::debug!(errors = errors.len(), "Config policy rejected table");
            Err(errors)
        }
    }
}

/// Policy nodes attached to namespace prefixes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPolicyTree {
    nodes: BTreeMap<String, ConfigPolicyNode>,
}

impl ConfigPolicyTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    fn path_key(prefix: &[String]) -> String {
        prefix.join("/")
    }

    /// Attach a node at a namespace prefix, merging with any node already there
    pub fn add(&mut self, prefix: &[String], node: ConfigPolicyNode) {
        self.nodes
            .entry(Self::path_key(prefix))
            .and_modify(|existing| existing.merge(&node))
            .or_insert(node);
    }

    /// Builder-style variant of [`add`](Self::add)
    pub fn with_node(mut self, prefix: &[&str], node: ConfigPolicyNode) -> Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        self.add(&prefix, node);
        self
    }

    /// Effective policy for a namespace: the merge of every node on the
    /// path from the root down to `namespace`, deeper nodes winning
    pub fn get(&self, namespace: &[String]) -> ConfigPolicyNode {
        let mut merged = ConfigPolicyNode::new();
        for depth in 0..=namespace.len() {
            if let Some(node) = self.nodes.get(&Self::path_key(&namespace[..depth])) {
                merged.merge(node);
            }
        }
        merged
    }

    /// Policy declared at the root, used for plugin-level configuration
    pub fn root(&self) -> ConfigPolicyNode {
        self.get(&[])
    }
}
