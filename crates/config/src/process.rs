use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aliases::AliasResolver;
use crate::error::{ConfigError, Result};
use crate::group::{apply_groups, Group};
use crate::value::ConfigValue;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Fully merged, immutable process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub process: ProcessMeta,
    #[serde(default)]
    pub aliases: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub inputs: SourceCatalog,
    #[serde(default)]
    pub outputs: SourceCatalog,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Worker count for chunked mutation; defaults to available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Sources of one category, split by kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub files: BTreeMap<String, SourceDefinition>,
    #[serde(default)]
    pub folders: BTreeMap<String, SourceDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Folder,
}

impl SourceKind {
    /// Singular label used in argument names (`--ledger-file`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl SourceCatalog {
    pub fn get(&self, key: &str) -> Option<(SourceKind, &SourceDefinition)> {
        self.files
            .get(key)
            .map(|d| (SourceKind::File, d))
            .or_else(|| self.folders.get(key).map(|d| (SourceKind::Folder, d)))
    }

    /// Every declared source, files first, each kind in key order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceKind, &str, &SourceDefinition)> {
        self.files
            .iter()
            .map(|(k, d)| (SourceKind::File, k.as_str(), d))
            .chain(self.folders.iter().map(|(k, d)| (SourceKind::Folder, k.as_str(), d)))
    }
}

// ---------------------------------------------------------------------------
// Source definition
// ---------------------------------------------------------------------------

/// Declarative schema for one input or output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceDefinition {
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub config: SourceConfig,
    #[serde(default)]
    pub mutations: MutationPhases,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionDefinition>,
}

impl SourceDefinition {
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }
}

/// A named sub-source (e.g. a spreadsheet tab).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionDefinition {
    #[serde(default)]
    pub config: SourceConfig,
    #[serde(default)]
    pub mutations: MutationPhases,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub read: ReadOptions,
    #[serde(default)]
    pub cli: CliOptions,
    /// Create the directory when the resolved path does not exist.
    #[serde(default)]
    pub create_if_absent: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliOptions {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
}

/// Read options for a delimited or spreadsheet source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadOptions {
    /// Field delimiter; sniffed when absent.
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Index of the header row among the rows left after `skip_rows`.
    #[serde(default)]
    pub header: usize,
    /// Explicit subset of columns to read, with their value types.
    /// Matched case-insensitively against the header.
    #[serde(default)]
    pub columns: Option<BTreeMap<String, ColumnType>>,
    /// Raw row indices (0-based, counted in the file) to drop before parsing.
    #[serde(default)]
    pub skip_rows: Vec<usize>,
    /// Read in chunks of this many data rows.
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[serde(alias = "str", alias = "string")]
    Text,
    #[serde(alias = "float")]
    Number,
    #[serde(alias = "int")]
    Integer,
}

/// Ordered mutation lists per lifecycle phase.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutationPhases {
    #[serde(default)]
    pub read: Vec<MutationSpec>,
    #[serde(default)]
    pub join: Vec<MutationSpec>,
    #[serde(default)]
    pub write: Vec<MutationSpec>,
}

/// `{ action = "...", params = { ... } }` as declared in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MutationSpec {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, ConfigValue>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Key of the output folder under `outputs.folders`.
    pub output: String,
    /// Identifier column, after projection.
    pub id_column: String,
    /// Amount column, after projection.
    pub amount_column: String,
    pub sides: Vec<SideConfig>,
}

/// One side of a two-way reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct SideConfig {
    pub name: String,
    /// Input keys combined (in order) into this side's table.
    pub sources: Vec<String>,
    /// `append_total_row` params applied to each folder file before combining.
    #[serde(default)]
    pub total_row: Option<BTreeMap<String, ConfigValue>>,
    #[serde(default)]
    pub set_aside: Vec<SetAsideRule>,
    #[serde(default)]
    pub mutations: Vec<MutationSpec>,
    #[serde(default)]
    pub on_join: Vec<MutationSpec>,
    #[serde(default)]
    pub on_complete_join: Vec<MutationSpec>,
    /// Ordered `[from, to]` projection + rename pairs.
    #[serde(default)]
    pub columns: Vec<(String, String)>,
    pub reconciled: String,
    pub outstanding: String,
    #[serde(default)]
    pub duplicates: Option<String>,
    #[serde(default)]
    pub inverse_pairs: Option<String>,
    #[serde(default)]
    pub carry_forward: Option<CarryForward>,
}

/// Rows moved out of a side into their own partition.
#[derive(Debug, Clone, Deserialize)]
pub struct SetAsideRule {
    pub partition: String,
    pub column: String,
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub is_null: bool,
    /// Apply after the side's mutations instead of right after combining.
    #[serde(default)]
    pub after_mutations: bool,
}

/// Previously outstanding rows appended to a side after projection.
#[derive(Debug, Clone, Deserialize)]
pub struct CarryForward {
    pub source: String,
    pub section: String,
    #[serde(default)]
    pub age_column: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ProcessConfig {
    /// Parse TOML, apply `[[groups]]`, and freeze the result.
    pub fn from_toml(input: &str) -> Result<Self> {
        let mut root = ConfigValue::parse_toml(input)?;

        let groups = match root.as_mapping_mut().and_then(|m| m.remove("groups")) {
            Some(ConfigValue::Sequence(items)) => items
                .iter()
                .map(Group::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(ConfigError::Validation("'groups' must be an array of tables".into()))
            }
            None => Vec::new(),
        };

        let merged = apply_groups(&root, &groups)?;
        let config: ProcessConfig = merged.deserialize()?;
        config.validate()?;
        info!(process = %config.process.name, groups = groups.len(), "configuration resolved");
        Ok(config)
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml(&input)
    }

    pub fn alias_resolver(&self) -> Result<AliasResolver> {
        AliasResolver::from_config(&ConfigValue::Mapping(self.aliases.clone()))
    }

    pub fn validate(&self) -> Result<()> {
        self.alias_resolver()?;

        if !self.outputs.folders.contains_key(&self.job.output) {
            return Err(ConfigError::Validation(format!(
                "job output '{}' is not declared under [outputs.folders]",
                self.job.output
            )));
        }

        let mut keys = std::collections::BTreeSet::new();
        for (_, key, _) in self.inputs.iter().chain(self.outputs.iter()) {
            if !keys.insert(key) {
                return Err(ConfigError::Validation(format!(
                    "source key '{key}' is declared more than once"
                )));
            }
        }

        if self.job.sides.len() != 2 {
            return Err(ConfigError::Validation(format!(
                "job requires exactly 2 sides, found {}",
                self.job.sides.len()
            )));
        }

        for side in &self.job.sides {
            if side.sources.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "side '{}' has no sources",
                    side.name
                )));
            }
            for source in &side.sources {
                if self.inputs.get(source).is_none() {
                    return Err(ConfigError::Validation(format!(
                        "side '{}': unknown input '{source}'",
                        side.name
                    )));
                }
            }
            for rule in &side.set_aside {
                if rule.equals.is_none() && !rule.is_null {
                    return Err(ConfigError::Validation(format!(
                        "side '{}': set_aside rule for '{}' needs 'equals' or 'is_null'",
                        side.name, rule.partition
                    )));
                }
            }
            if let Some(ref carry) = side.carry_forward {
                let declared = self
                    .inputs
                    .get(&carry.source)
                    .map(|(_, d)| d.sections.contains_key(&carry.section));
                if declared != Some(true) {
                    return Err(ConfigError::Validation(format!(
                        "side '{}': carry_forward needs section '{}' on input '{}'",
                        side.name, carry.section, carry.source
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
