//! The configurable two-sided reconciliation job.
//!
//! Per side: load every source (one document per folder file), stamp folder
//! files with their total row, combine them, set rows aside, mutate, project,
//! append carried-forward items and split out duplicates. The two unique sets
//! are then reconciled against each other.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use docrecon_config::{
    AliasResolver, CarryForward, ConfigError, MutationSpec, ProcessConfig, SetAsideRule, SideConfig, SourceKind,
};
use docrecon_engine::{ActionRegistry, MutationPipeline, Table, Value, WorkerPool};
use docrecon_io::{csv, Document, DocumentSet, JoinHooks, LoadContext, SourcePath};

use crate::error::{ReconError, Result};
use crate::matcher::{reconcile, sort_by_amount, split_duplicates, split_inverse_pairs};

/// Which stage of the job produced a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    SetAside,
    Reconciled,
    Outstanding,
    Duplicates,
    InversePairs,
}

/// One named result table, written as `<NAME>.csv`.
#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    pub side: String,
    pub kind: PartitionKind,
    pub table: Table,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobMeta {
    pub process: String,
    pub engine_version: String,
    pub run_at: String,
    pub workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideSummary {
    pub name: String,
    pub documents: usize,
    pub loaded: usize,
    pub set_aside: usize,
    pub carried_forward: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub inverse_pairs: usize,
    pub reconciled: usize,
    pub outstanding: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub name: String,
    pub side: String,
    pub kind: PartitionKind,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub sides: Vec<SideSummary>,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub meta: JobMeta,
    pub summary: JobSummary,
    #[serde(skip)]
    pub partitions: Vec<Partition>,
}

impl JobResult {
    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| json_error(&e.to_string()))
    }
}

/// `{"error": message}`, escaped, for when the summary itself cannot be
/// serialised.
fn json_error(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Pipelines of one side, resolved before anything is read.
struct SidePlan<'c> {
    config: &'c SideConfig,
    total_row: Option<MutationPipeline>,
    mutations: MutationPipeline,
    hooks: JoinHooks,
}

/// A side after loading, before it is matched against the other.
struct PreparedSide {
    unique: Table,
    duplicates: Table,
    inverse_pairs: Table,
    set_aside: Vec<(String, Table)>,
    summary: SideSummary,
}

pub struct Job<'c> {
    config: &'c ProcessConfig,
    registry: ActionRegistry,
    sides: Vec<SidePlan<'c>>,
    write: MutationPipeline,
}

impl<'c> Job<'c> {
    /// Resolve every action the run will need. Unknown action names fail
    /// here, before any document is opened.
    pub fn new(config: &'c ProcessConfig, registry: ActionRegistry) -> Result<Self> {
        for (_, _, definition) in config.inputs.iter() {
            let mut phases: Vec<&[MutationSpec]> = vec![&definition.mutations.read, &definition.mutations.join];
            phases.extend(definition.sections.values().map(|s| s.mutations.read.as_slice()));
            for specs in phases {
                registry.pipeline(specs)?;
            }
        }

        let sides = config
            .job
            .sides
            .iter()
            .map(|side| {
                let total_row = match side.total_row {
                    Some(ref params) => Some(registry.pipeline(&[MutationSpec {
                        action: "append_total_row".to_string(),
                        params: params.clone(),
                    }])?),
                    None => None,
                };
                Ok(SidePlan {
                    config: side,
                    total_row,
                    mutations: registry.pipeline(&side.mutations)?,
                    hooks: JoinHooks {
                        on_before_join: MutationPipeline::default(),
                        on_join: registry.pipeline(&side.on_join)?,
                        on_complete_join: registry.pipeline(&side.on_complete_join)?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let write = match config.outputs.folders.get(&config.job.output) {
            Some(output) => registry.pipeline(&output.mutations.write)?,
            None => MutationPipeline::default(),
        };

        Ok(Self {
            config,
            registry,
            sides,
            write,
        })
    }

    /// Run both sides and reconcile them.
    ///
    /// `inputs` maps input keys to resolved paths. Keys a side does not use
    /// are ignored; a key it does use but that is absent is an error.
    pub fn run(&self, inputs: &BTreeMap<String, SourcePath>, pool: &WorkerPool) -> Result<JobResult> {
        let mut aliases = self.config.alias_resolver()?;

        let mut prepared = Vec::with_capacity(self.sides.len());
        for plan in &self.sides {
            prepared.push(self.prepare_side(plan, inputs, pool, &mut aliases)?);
        }
        let [first, second]: [PreparedSide; 2] = prepared
            .try_into()
            .map_err(|_| ConfigError::Validation("job requires exactly 2 sides".into()))?;

        let job = &self.config.job;
        let mut partitions = Vec::new();
        for side in [&first, &second] {
            for (name, table) in &side.set_aside {
                partitions.push(Partition {
                    name: name.clone(),
                    side: side.summary.name.clone(),
                    kind: PartitionKind::SetAside,
                    table: table.clone(),
                });
            }
        }

        let rec_first = reconcile(first.unique.clone(), &second.unique, &job.id_column)?;
        let rec_second = reconcile(second.unique.clone(), &first.unique, &job.id_column)?;

        let mut summaries = Vec::with_capacity(2);
        for (plan, side, rec) in [
            (&self.sides[0], first, rec_first),
            (&self.sides[1], second, rec_second),
        ] {
            let cfg = plan.config;
            let mut summary = side.summary;
            summary.reconciled = rec.reconciled.len();
            summary.outstanding = rec.unreconciled.len();
            info!(
                side = %cfg.name,
                reconciled = summary.reconciled,
                outstanding = summary.outstanding,
                "side reconciled"
            );

            partitions.push(Partition {
                name: cfg.reconciled.clone(),
                side: cfg.name.clone(),
                kind: PartitionKind::Reconciled,
                table: sort_by_amount(rec.reconciled, &job.amount_column)?,
            });
            partitions.push(Partition {
                name: cfg.outstanding.clone(),
                side: cfg.name.clone(),
                kind: PartitionKind::Outstanding,
                table: sort_by_amount(rec.unreconciled, &job.amount_column)?,
            });
            if let Some(ref name) = cfg.duplicates {
                partitions.push(Partition {
                    name: name.clone(),
                    side: cfg.name.clone(),
                    kind: PartitionKind::Duplicates,
                    table: side.duplicates,
                });
            }
            if let Some(ref name) = cfg.inverse_pairs {
                partitions.push(Partition {
                    name: name.clone(),
                    side: cfg.name.clone(),
                    kind: PartitionKind::InversePairs,
                    table: side.inverse_pairs,
                });
            }
            summaries.push(summary);
        }

        let summary = JobSummary {
            sides: summaries,
            partitions: partitions
                .iter()
                .map(|p| PartitionSummary {
                    name: p.name.clone(),
                    side: p.side.clone(),
                    kind: p.kind,
                    rows: p.table.len(),
                })
                .collect(),
        };

        Ok(JobResult {
            meta: JobMeta {
                process: self.config.process.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
                workers: pool.workers(),
            },
            summary,
            partitions,
        })
    }

    /// Apply the output's `write` mutations to each partition and write it
    /// to `dir` as `<NAME>.csv`. Returns the written paths in order.
    pub fn write(&self, result: &JobResult, dir: &Path, pool: &WorkerPool) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(result.partitions.len());
        for partition in &result.partitions {
            let table = self.write.run(partition.table.clone(), pool, &partition.name)?;
            let path = dir.join(format!("{}.csv", partition.name));
            csv::write(&table, &path)?;
            debug!(partition = %partition.name, rows = table.len(), path = %path.display(), "partition written");
            written.push(path);
        }
        info!(dir = %dir.display(), partitions = written.len(), "partitions written");
        Ok(written)
    }

    fn prepare_side(
        &self,
        plan: &SidePlan<'_>,
        inputs: &BTreeMap<String, SourcePath>,
        pool: &WorkerPool,
        aliases: &mut AliasResolver,
    ) -> Result<PreparedSide> {
        let side = plan.config;
        let mut summary = SideSummary {
            name: side.name.clone(),
            ..Default::default()
        };

        let mut documents = Vec::new();
        for key in &side.sources {
            let (kind, definition) = self
                .config
                .inputs
                .get(key)
                .ok_or_else(|| ReconError::MissingInput(key.clone()))?;
            let source = inputs.get(key).ok_or_else(|| ReconError::MissingInput(key.clone()))?;
            for path in source.files() {
                let mut ctx = LoadContext {
                    registry: &self.registry,
                    pool,
                    aliases: &mut *aliases,
                };
                let mut doc = Document::open(key, path, definition, &mut ctx)?;
                if kind == SourceKind::Folder {
                    if let Some(ref total_row) = plan.total_row {
                        doc.mutate(total_row, pool)?;
                    }
                }
                documents.push(doc);
            }
        }
        summary.documents = documents.len();

        let mut set = DocumentSet::new(&side.name);
        set.append(documents, &plan.hooks, pool)?;
        let alias_keys = set.alias_keys().to_vec();
        let mut table = set.into_document().into_table();
        summary.loaded = table.len();

        let (early, late): (Vec<&SetAsideRule>, Vec<&SetAsideRule>) =
            side.set_aside.iter().partition(|rule| !rule.after_mutations);

        let mut set_aside = Vec::new();
        table = set_aside_rows(table, &early, &side.name, &mut set_aside)?;
        table = plan.mutations.run(table, pool, &side.name)?;
        table = set_aside_rows(table, &late, &side.name, &mut set_aside)?;
        if !alias_keys.is_empty() {
            for (_, partition) in &mut set_aside {
                restore_original_names(partition, aliases, &alias_keys)?;
            }
        }
        summary.set_aside = set_aside.iter().map(|(_, t)| t.len()).sum();

        table = project(table, &side.columns)?;

        if let Some(ref carry) = side.carry_forward {
            let carried = self.load_carry_forward(carry, inputs, pool, aliases)?;
            summary.carried_forward = carried.len();
            table = table.append(carried);
        }

        let job = &self.config.job;
        let split = split_duplicates(table, std::slice::from_ref(&job.id_column))?;
        let inverse = split_inverse_pairs(split.duplicates, &job.id_column, &job.amount_column)?;
        summary.unique = split.unique.len();
        summary.duplicates = inverse.remaining.len();
        summary.inverse_pairs = inverse.pairs.len();
        info!(
            side = %side.name,
            documents = summary.documents,
            loaded = summary.loaded,
            set_aside = summary.set_aside,
            unique = summary.unique,
            duplicates = summary.duplicates,
            inverse_pairs = summary.inverse_pairs,
            "side prepared"
        );

        Ok(PreparedSide {
            unique: split.unique,
            duplicates: inverse.remaining,
            inverse_pairs: inverse.pairs,
            set_aside,
            summary,
        })
    }

    fn load_carry_forward(
        &self,
        carry: &CarryForward,
        inputs: &BTreeMap<String, SourcePath>,
        pool: &WorkerPool,
        aliases: &mut AliasResolver,
    ) -> Result<Table> {
        let (_, definition) = self
            .config
            .inputs
            .get(&carry.source)
            .ok_or_else(|| ReconError::MissingInput(carry.source.clone()))?;
        let source = inputs
            .get(&carry.source)
            .ok_or_else(|| ReconError::MissingInput(carry.source.clone()))?;

        let mut tables = Vec::new();
        for path in source.files() {
            let mut ctx = LoadContext {
                registry: &self.registry,
                pool,
                aliases: &mut *aliases,
            };
            let mut doc = Document::open(&carry.source, path, definition, &mut ctx)?;
            tables.push(doc.take_section(&carry.section)?.into_table());
        }
        let mut table = Table::concat(tables);

        if let Some(ref age) = carry.age_column {
            if !table.is_empty() {
                table.ensure_column(age);
                table.map_column(age, |v| Ok(Value::Integer(v.as_f64().unwrap_or(0.0) as i64 + 1)))?;
            }
        }
        debug!(source = %carry.source, section = %carry.section, rows = table.len(), "carried forward");
        Ok(table)
    }
}

/// Whether `value` satisfies `rule`.
fn matches_rule(rule: &SetAsideRule, value: &Value) -> bool {
    if rule.is_null && value.is_empty() {
        return true;
    }
    match rule.equals {
        Some(ref expected) => !value.is_empty() && value.render() == *expected,
        None => false,
    }
}

fn set_aside_rows(
    table: Table,
    rules: &[&SetAsideRule],
    side: &str,
    out: &mut Vec<(String, Table)>,
) -> Result<Table> {
    let mut table = table;
    for rule in rules {
        if table.is_empty() {
            out.push((rule.partition.clone(), table.clone()));
            continue;
        }
        let idx = table.column_index(&rule.column).ok_or_else(|| ReconError::MissingColumn {
            side: side.to_string(),
            column: rule.column.clone(),
        })?;
        let (taken, rest) = table.partition(|row| matches_rule(rule, &row.values()[idx]));
        debug!(side, partition = %rule.partition, rows = taken.len(), "rows set aside");
        out.push((rule.partition.clone(), taken));
        table = rest;
    }
    Ok(table)
}

/// Rename canonical column names back to what the sources called them.
///
/// `keys` are the substitution keys of the combined members, in append
/// order; when members used different originals for one canonical name the
/// first member's wins.
fn restore_original_names(table: &mut Table, aliases: &AliasResolver, keys: &[String]) -> Result<()> {
    let mut originals: BTreeMap<String, String> = BTreeMap::new();
    for key in keys {
        for (original, canonical) in aliases.get_original(key, None) {
            originals.entry(canonical).or_insert(original);
        }
    }
    table.rename_columns(|c| originals.get(c).cloned().unwrap_or_else(|| c.to_string()))?;
    Ok(())
}

/// Keep the `from` columns in order and rename each to its `to`.
fn project(table: Table, columns: &[(String, String)]) -> Result<Table> {
    if columns.is_empty() {
        return Ok(table);
    }
    let from: Vec<String> = columns.iter().map(|(f, _)| f.clone()).collect();
    let mut projected = if table.is_empty() && table.width() == 0 {
        Table::new(from)?
    } else {
        table.select(&from)?
    };
    let renames: BTreeMap<&str, &str> = columns.iter().map(|(f, t)| (f.as_str(), t.as_str())).collect();
    projected.rename_columns(|c| renames.get(c).map(|t| t.to_string()).unwrap_or_else(|| c.to_string()))?;
    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::from_input(v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn rule(column: &str, equals: Option<&str>, is_null: bool) -> SetAsideRule {
        SetAsideRule {
            partition: "P".into(),
            column: column.into(),
            equals: equals.map(str::to_string),
            is_null,
            after_mutations: false,
        }
    }

    #[test]
    fn set_aside_by_value_and_null() {
        let t = table(&["id", "kind"], &[&["1", "Special_Case"], &["2", ""], &["3", "normal"]]);
        let mut out = Vec::new();
        let special = rule("kind", Some("Special_Case"), false);
        let blank = rule("kind", None, true);
        let rest = set_aside_rows(t, &[&special, &blank], "s", &mut out).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(out[0].1.value(0, "id"), Some(&Value::text("1")));
        assert_eq!(out[1].1.value(0, "id"), Some(&Value::text("2")));
    }

    #[test]
    fn set_aside_missing_column() {
        let t = table(&["id"], &[&["1"]]);
        let err = set_aside_rows(t, &[&rule("kind", Some("x"), false)], "s", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { .. }));

        let mut out = Vec::new();
        set_aside_rows(Table::default(), &[&rule("kind", Some("x"), false)], "s", &mut out).unwrap();
        assert!(out[0].1.is_empty());
    }

    #[test]
    fn projection_orders_and_renames() {
        let t = table(&["b", "a", "c"], &[&["2", "1", "3"]]);
        let p = project(t, &[("a".into(), "A".into()), ("b".into(), "B".into())]).unwrap();
        assert_eq!(p.columns(), &["A".to_string(), "B".to_string()][..]);
        assert_eq!(p.value(0, "A"), Some(&Value::text("1")));

        let empty = project(Table::default(), &[("a".into(), "A".into())]).unwrap();
        assert_eq!(empty.columns(), &["A".to_string()][..]);
    }

    #[test]
    fn json_error_is_valid_json() {
        let out = json_error(r#"bad "quoted" value \ here"#);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["error"], r#"bad "quoted" value \ here"#);
    }

    #[test]
    fn original_names_restored() {
        let mut aliases = AliasResolver::new(BTreeMap::from([(
            "amount".to_string(),
            vec!["amt.lcy".to_string()],
        )]))
        .unwrap();
        let (key, _) = aliases.get_aliases(&["amt.lcy".to_string(), "id".to_string()]);
        let mut t = table(&["amount", "id"], &[&["1", "x"]]);
        restore_original_names(&mut t, &aliases, &[key.unwrap()]).unwrap();
        assert_eq!(t.columns(), &["amt.lcy".to_string(), "id".to_string()][..]);
    }

    #[test]
    fn original_names_restored_from_every_member() {
        let mut aliases = AliasResolver::new(BTreeMap::from([
            ("amount".to_string(), vec!["amt.lcy".to_string(), "settlement_impact".to_string()]),
            ("id".to_string(), vec!["rrn".to_string()]),
        ]))
        .unwrap();
        let (ledger, _) = aliases.get_aliases(&["amt.lcy".to_string(), "narrative".to_string()]);
        let (atm, _) = aliases.get_aliases(&["settlement_impact".to_string(), "rrn".to_string()]);
        let keys = vec![ledger.unwrap(), atm.unwrap()];

        let mut t = table(&["amount", "narrative", "id"], &[&["1", "x", "r"]]);
        restore_original_names(&mut t, &aliases, &keys).unwrap();
        // `amount` keeps the first member's name, `id` comes from the second
        assert_eq!(
            t.columns(),
            &["amt.lcy".to_string(), "narrative".to_string(), "rrn".to_string()][..]
        );
    }
}
