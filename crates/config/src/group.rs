//! Group merge: a shared configuration fragment applied to named sources.
//!
//! A group is declared as
//!
//! ```toml
//! [[groups]]
//! group = ["inputs.atm", "inputs.qt"]
//! [groups.config.read]
//! delimiter = ","
//! ```
//!
//! Every key other than `group` forms the fragment. Members are `category.key`
//! references; `key` is looked up in every sub-table of `category` (e.g. both
//! `inputs.files` and `inputs.folders`). The member's own values take
//! precedence over the fragment.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::value::{merge_defaults, ConfigValue};

const MEMBERS_KEY: &str = "group";

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub members: Vec<String>,
    pub fragment: ConfigValue,
}

impl Group {
    /// Build a group from its declared mapping.
    pub fn from_value(value: &ConfigValue) -> Result<Self> {
        let map = value.as_mapping().ok_or_else(|| {
            ConfigError::Validation("each [[groups]] entry must be a table".into())
        })?;
        let members = map
            .get(MEMBERS_KEY)
            .and_then(ConfigValue::string_list)
            .ok_or_else(|| {
                ConfigError::Validation("group entry is missing its 'group' member list".into())
            })?;
        let fragment: BTreeMap<String, ConfigValue> = map
            .iter()
            .filter(|(k, _)| k.as_str() != MEMBERS_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            members,
            fragment: ConfigValue::Mapping(fragment),
        })
    }
}

/// A resolved member location: `root[category][parent][key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemberPath {
    category: String,
    parent: String,
    key: String,
}

fn resolve_member(root: &ConfigValue, reference: &str) -> Result<Vec<MemberPath>> {
    let (category, key) = reference
        .split_once('.')
        .filter(|(c, k)| !c.is_empty() && !k.is_empty())
        .ok_or_else(|| ConfigError::MalformedReference(reference.to_string()))?;

    let category_map = root
        .get(category)
        .and_then(ConfigValue::as_mapping)
        .ok_or_else(|| ConfigError::UnknownCategory {
            reference: reference.to_string(),
            category: category.to_string(),
        })?;

    let paths: Vec<MemberPath> = category_map
        .iter()
        .filter(|(_, parent)| parent.get(key).is_some())
        .map(|(parent, _)| MemberPath {
            category: category.to_string(),
            parent: parent.clone(),
            key: key.to_string(),
        })
        .collect();

    if paths.is_empty() {
        return Err(ConfigError::UnknownMember {
            reference: reference.to_string(),
            category: category.to_string(),
            key: key.to_string(),
        });
    }
    Ok(paths)
}

/// Apply every group to `root`, returning the merged tree.
///
/// All references are resolved before anything is merged, so an invalid
/// reference leaves no partially merged configuration behind.
pub fn apply_groups(root: &ConfigValue, groups: &[Group]) -> Result<ConfigValue> {
    let mut plan: Vec<(MemberPath, &ConfigValue)> = Vec::new();
    for group in groups {
        for reference in &group.members {
            for path in resolve_member(root, reference)? {
                plan.push((path, &group.fragment));
            }
        }
    }

    let mut merged = root.clone();
    for (path, fragment) in plan {
        let member = merged
            .as_mapping_mut()
            .and_then(|m| m.get_mut(&path.category))
            .and_then(ConfigValue::as_mapping_mut)
            .and_then(|m| m.get_mut(&path.parent))
            .and_then(ConfigValue::as_mapping_mut)
            .and_then(|m| m.get_mut(&path.key));
        if let Some(member) = member {
            debug!(category = %path.category, parent = %path.parent, key = %path.key, "applying group fragment");
            *member = merge_defaults(member, fragment);
        }
    }
    Ok(merged)
}
