//! Tagged configuration tree and deep merge.
//!
//! Every node is a [`Scalar`], a sequence or a mapping. Merging dispatches on
//! the pair of tags: mapping/mapping recurses key by key, sequence/sequence
//! concatenates, and every other pairing is a conflict settled by a
//! [`Precedence`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(BTreeMap<String, ConfigValue>),
}

/// Which side keeps its value when two nodes cannot be merged structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// The incoming (right-hand) value replaces the existing one.
    Incoming,
    /// The existing (left-hand) value is kept; incoming only fills gaps.
    Existing,
}

impl ConfigValue {
    pub fn empty_mapping() -> Self {
        Self::Mapping(BTreeMap::new())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigValue>> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(Scalar::Integer(i)) => Some(*i as f64),
            Self::Scalar(Scalar::Float(x)) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Look up a key when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// A sequence of strings, e.g. a column list. Non-string items are skipped.
    pub fn string_list(&self) -> Option<Vec<String>> {
        self.as_sequence()
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
    }

    pub fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Self::Scalar(Scalar::String(s)),
            toml::Value::Integer(i) => Self::Scalar(Scalar::Integer(i)),
            toml::Value::Float(x) => Self::Scalar(Scalar::Float(x)),
            toml::Value::Boolean(b) => Self::Scalar(Scalar::Bool(b)),
            toml::Value::Datetime(dt) => Self::Scalar(Scalar::String(dt.to_string())),
            toml::Value::Array(items) => {
                Self::Sequence(items.into_iter().map(Self::from_toml).collect())
            }
            toml::Value::Table(table) => Self::Mapping(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_toml(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_toml(&self) -> toml::Value {
        match self {
            Self::Scalar(Scalar::String(s)) => toml::Value::String(s.clone()),
            Self::Scalar(Scalar::Integer(i)) => toml::Value::Integer(*i),
            Self::Scalar(Scalar::Float(x)) => toml::Value::Float(*x),
            Self::Scalar(Scalar::Bool(b)) => toml::Value::Boolean(*b),
            Self::Sequence(items) => toml::Value::Array(items.iter().map(Self::to_toml).collect()),
            Self::Mapping(map) => toml::Value::Table(
                map.iter().map(|(k, v)| (k.clone(), v.to_toml())).collect(),
            ),
        }
    }

    pub fn parse_toml(input: &str) -> Result<Self> {
        let value: toml::Value =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self::from_toml(value))
    }

    /// Deserialize this node into a typed structure.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        self.to_toml()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Deep-merge where `incoming` wins scalar conflicts.
pub fn deep_merge(existing: &ConfigValue, incoming: &ConfigValue) -> ConfigValue {
    merge(existing, incoming, Precedence::Incoming)
}

/// Deep-merge `defaults` underneath `own`: own scalars survive, sequences are
/// `own ++ defaults`, absent keys are filled in from `defaults`.
pub fn merge_defaults(own: &ConfigValue, defaults: &ConfigValue) -> ConfigValue {
    merge(own, defaults, Precedence::Existing)
}

pub fn merge(existing: &ConfigValue, incoming: &ConfigValue, precedence: Precedence) -> ConfigValue {
    match (existing, incoming) {
        (ConfigValue::Mapping(a), ConfigValue::Mapping(b)) => {
            ConfigValue::Mapping(merge_mappings(a, b, precedence))
        }
        (ConfigValue::Sequence(a), ConfigValue::Sequence(b)) => {
            ConfigValue::Sequence(merge_sequences(a, b))
        }
        _ => resolve_conflict(existing, incoming, precedence),
    }
}

fn merge_mappings(
    existing: &BTreeMap<String, ConfigValue>,
    incoming: &BTreeMap<String, ConfigValue>,
    precedence: Precedence,
) -> BTreeMap<String, ConfigValue> {
    let mut result = existing.clone();
    for (key, value) in incoming {
        let merged = match result.get(key) {
            Some(current) => merge(current, value, precedence),
            None => value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

fn merge_sequences(existing: &[ConfigValue], incoming: &[ConfigValue]) -> Vec<ConfigValue> {
    existing.iter().chain(incoming).cloned().collect()
}

fn resolve_conflict(
    existing: &ConfigValue,
    incoming: &ConfigValue,
    precedence: Precedence,
) -> ConfigValue {
    match precedence {
        Precedence::Incoming => incoming.clone(),
        Precedence::Existing => existing.clone(),
    }
}
