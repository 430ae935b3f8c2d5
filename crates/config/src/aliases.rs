//! Column alias resolution.
//!
//! Maps alternate column names supplied by different sources onto one
//! canonical name. Substitutions computed for a given input list are cached
//! under a content hash of that list, so the exact renaming can be replayed
//! later (e.g. to restore original headers on output).

use std::collections::{BTreeMap, HashMap, VecDeque};

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::{ConfigError, Result};
use crate::value::ConfigValue;

const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct AliasResolver {
    aliases: BTreeMap<String, Vec<String>>,
    cache: HashMap<String, BTreeMap<String, String>>,
    cache_order: VecDeque<String>,
    capacity: usize,
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AliasResolver {
    /// Build a resolver, rejecting any alias declared more than once.
    pub fn new(aliases: BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for (canonical, names) in &aliases {
            for alias in names {
                if let Some(first) = owner.insert(alias, canonical) {
                    return Err(ConfigError::DuplicateAlias {
                        alias: alias.clone(),
                        first: first.to_string(),
                        second: canonical.clone(),
                    });
                }
            }
        }
        Ok(Self {
            aliases,
            ..Self::default()
        })
    }

    /// Build from an `[aliases]` table whose values are a string or a list of strings.
    pub fn from_config(value: &ConfigValue) -> Result<Self> {
        let Some(map) = value.as_mapping() else {
            return Err(ConfigError::Validation("[aliases] must be a table".into()));
        };
        let mut aliases = BTreeMap::new();
        for (canonical, entry) in map {
            let names = match entry {
                ConfigValue::Sequence(_) => entry.string_list().unwrap_or_default(),
                other => match other.as_str() {
                    Some(s) => vec![s.to_string()],
                    None => {
                        return Err(ConfigError::Validation(format!(
                            "alias '{canonical}' must be a string or a list of strings"
                        )))
                    }
                },
            };
            aliases.insert(canonical.clone(), names);
        }
        Self::new(aliases)
    }

    /// Bound the number of cached substitution sets (oldest evicted first).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Canonical key for `name`, or `name` itself when it is not an alias.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        for (canonical, names) in &self.aliases {
            if names.iter().any(|n| n == name) {
                return canonical;
            }
        }
        trace!(name, "no alias registered");
        name
    }

    /// Resolve every name in `names`.
    ///
    /// Returns the cache key of the original list together with the
    /// substitutions that actually changed something. When nothing changed the
    /// key is `None` and nothing is cached.
    pub fn get_aliases(&mut self, names: &[String]) -> (Option<String>, BTreeMap<String, String>) {
        let substitutions: BTreeMap<String, String> = names
            .iter()
            .filter_map(|name| {
                let resolved = self.resolve(name);
                (resolved != name).then(|| (name.clone(), resolved.to_string()))
            })
            .collect();

        if substitutions.is_empty() {
            return (None, substitutions);
        }

        let key = cache_key(names);
        if !self.cache.contains_key(&key) {
            self.cache_order.push_back(key.clone());
            while self.cache_order.len() > self.capacity {
                if let Some(evicted) = self.cache_order.pop_front() {
                    self.cache.remove(&evicted);
                }
            }
        }
        self.cache.insert(key.clone(), substitutions.clone());
        (Some(key), substitutions)
    }

    /// Retrieve cached substitutions.
    ///
    /// Without `order`, returns the cached pairs. With `order`, returns one
    /// pair per requested name, in the requested order, mapping each name to
    /// its substitution or to itself.
    pub fn get_original(&self, cache_key: &str, order: Option<&[String]>) -> Vec<(String, String)> {
        let cached = self.cache.get(cache_key);
        match order {
            None => cached
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            Some(order) => order
                .iter()
                .map(|name| {
                    let sub = cached.and_then(|m| m.get(name)).unwrap_or(name);
                    (name.clone(), sub.clone())
                })
                .collect(),
        }
    }
}

/// Stable hash of a name list; identical lists always share a key.
fn cache_key(names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
