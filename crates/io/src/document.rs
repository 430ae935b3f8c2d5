//! Documents: one loaded source bound to its definition.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use docrecon_config::{AliasResolver, ReadOptions, SourceDefinition, DEFAULT_SECTION};
use docrecon_engine::{ActionRegistry, MutationPipeline, Table, WorkerPool};

use crate::error::{DocumentError, Result};
use crate::{csv, xlsx};

/// Collaborators shared by every document of a run.
pub struct LoadContext<'a> {
    pub registry: &'a ActionRegistry,
    pub pool: &'a WorkerPool,
    pub aliases: &'a mut AliasResolver,
}

/// A named sub-table of a document (e.g. one spreadsheet sheet).
#[derive(Debug, Clone)]
pub struct DocumentSection {
    name: String,
    table: Table,
    alias_key: Option<String>,
}

impl DocumentSection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Cache key of the column substitutions made at load, if any.
    pub fn alias_key(&self) -> Option<&str> {
        self.alias_key.as_deref()
    }
}

/// A loaded source, its sections, and its `join`-phase pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    path: Option<PathBuf>,
    sections: Vec<DocumentSection>,
    sectioned: bool,
    join: MutationPipeline,
}

/// What to load for one section before reading starts.
struct SectionPlan<'d> {
    name: &'d str,
    read: &'d ReadOptions,
    pipeline: MutationPipeline,
}

impl Document {
    /// Load `path` per `definition` and apply its `read` mutations.
    ///
    /// Every declared action is resolved before the source is touched. A
    /// missing file is not an error: it is logged and every section is left
    /// with an empty table.
    pub fn open(
        name: &str,
        path: &Path,
        definition: &SourceDefinition,
        ctx: &mut LoadContext<'_>,
    ) -> Result<Self> {
        let sectioned = definition.has_sections();
        let plans: Vec<SectionPlan<'_>> = if sectioned {
            definition
                .sections
                .iter()
                .map(|(section, def)| {
                    Ok(SectionPlan {
                        name: section.as_str(),
                        read: &def.config.read,
                        pipeline: ctx.registry.pipeline(&def.mutations.read)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![SectionPlan {
                name: DEFAULT_SECTION,
                read: &definition.config.read,
                pipeline: ctx.registry.pipeline(&definition.mutations.read)?,
            }]
        };
        let join = ctx.registry.pipeline(&definition.mutations.join)?;

        let tables = if path.is_file() {
            load_tables(name, path, sectioned, &plans)?
        } else {
            warn!(document = name, path = %path.display(), "source file missing, continuing with an empty table");
            let sections = plans
                .into_iter()
                .map(|plan| DocumentSection {
                    name: plan.name.to_string(),
                    table: Table::default(),
                    alias_key: None,
                })
                .collect();
            return Ok(Self {
                name: name.to_string(),
                path: Some(path.to_path_buf()),
                sections,
                sectioned,
                join,
            });
        };

        let mut sections = Vec::with_capacity(plans.len());
        for (plan, mut table) in plans.into_iter().zip(tables) {
            let columns = table.columns().to_vec();
            let (alias_key, substitutions) = ctx.aliases.get_aliases(&columns);
            if !substitutions.is_empty() {
                check_alias_collisions(name, &columns, &substitutions)?;
                table.rename_columns(|c| substitutions.get(c).cloned().unwrap_or_else(|| c.to_string()))?;
            }
            let table = plan.pipeline.run(table, ctx.pool, name)?;
            sections.push(DocumentSection {
                name: plan.name.to_string(),
                table,
                alias_key,
            });
        }

        info!(
            document = name,
            path = %path.display(),
            sections = sections.len(),
            rows = sections.iter().map(|s| s.table.len()).sum::<usize>(),
            "document loaded"
        );
        Ok(Self {
            name: name.to_string(),
            path: Some(path.to_path_buf()),
            sections,
            sectioned,
            join,
        })
    }

    /// Wrap an already-built table as a single-section document.
    pub fn from_table(name: &str, table: Table) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            sections: vec![DocumentSection {
                name: DEFAULT_SECTION.to_string(),
                table,
                alias_key: None,
            }],
            sectioned: false,
            join: MutationPipeline::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the definition declared named sections.
    pub fn is_sectioned(&self) -> bool {
        self.sectioned
    }

    pub fn sections(&self) -> &[DocumentSection] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&DocumentSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn take_section(&mut self, name: &str) -> Result<DocumentSection> {
        let idx = self
            .sections
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| DocumentError::MissingSection {
                document: self.name.clone(),
                section: name.to_string(),
            })?;
        Ok(self.sections.remove(idx))
    }

    /// The first section's table (the implicit one when none are declared).
    pub fn table(&self) -> Option<&Table> {
        self.sections.first().map(|s| &s.table)
    }

    pub fn alias_key(&self) -> Option<&str> {
        self.sections.first().and_then(DocumentSection::alias_key)
    }

    pub fn row_count(&self) -> usize {
        self.sections.iter().map(|s| s.table.len()).sum()
    }

    /// Run `pipeline` over every section, named after this document.
    pub fn mutate(&mut self, pipeline: &MutationPipeline, pool: &WorkerPool) -> Result<()> {
        for section in &mut self.sections {
            let table = std::mem::take(&mut section.table);
            section.table = pipeline.run(table, pool, &self.name)?;
        }
        Ok(())
    }

    pub fn join_pipeline(&self) -> &MutationPipeline {
        &self.join
    }

    /// All sections stacked in order.
    pub fn into_table(self) -> Table {
        Table::concat(self.sections.into_iter().map(|s| s.table).collect())
    }
}

/// Two source columns must not resolve to the same canonical name.
fn check_alias_collisions(document: &str, columns: &[String], substitutions: &BTreeMap<String, String>) -> Result<()> {
    let mut resolved: HashMap<&str, &str> = HashMap::with_capacity(columns.len());
    for column in columns {
        let target = substitutions.get(column).map_or(column.as_str(), String::as_str);
        if let Some(first) = resolved.insert(target, column.as_str()) {
            return Err(DocumentError::AliasCollision {
                document: document.to_string(),
                column: target.to_string(),
                first: first.to_string(),
                second: column.clone(),
            });
        }
    }
    Ok(())
}

fn load_tables(name: &str, path: &Path, sectioned: bool, plans: &[SectionPlan<'_>]) -> Result<Vec<Table>> {
    if xlsx::is_spreadsheet(path) {
        let mut workbook = xlsx::Workbook::open(path)?;
        if !sectioned {
            return Ok(vec![workbook.read_first(plans[0].read)?]);
        }
        let available: BTreeSet<String> = workbook.sheet_names().into_iter().collect();
        let mut tables = Vec::with_capacity(plans.len());
        for plan in plans {
            if !available.contains(plan.name) {
                return Err(DocumentError::MissingSection {
                    document: name.to_string(),
                    section: plan.name.to_string(),
                });
            }
            tables.push(workbook.read_sheet(plan.name, plan.read)?);
        }
        return Ok(tables);
    }

    if sectioned {
        return Err(DocumentError::SectionsUnsupported {
            document: name.to_string(),
        });
    }
    Ok(vec![csv::read(path, plans[0].read)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrecon_config::{ConfigValue, ProcessConfig};
    use docrecon_engine::Value;
    use std::fs;
    use tempfile::tempdir;

    fn definition(toml: &str) -> SourceDefinition {
        ConfigValue::parse_toml(toml).unwrap().deserialize().unwrap()
    }

    #[test]
    fn missing_file_soft_fails() {
        let dir = tempdir().unwrap();
        let registry = ActionRegistry::builtin();
        let pool = WorkerPool::new(2).unwrap();
        let mut aliases = AliasResolver::default();
        let mut ctx = LoadContext {
            registry: &registry,
            pool: &pool,
            aliases: &mut aliases,
        };
        let doc = Document::open("ledger", &dir.path().join("gone.csv"), &SourceDefinition::default(), &mut ctx).unwrap();
        assert_eq!(doc.row_count(), 0);
        assert_eq!(doc.sections()[0].name(), DEFAULT_SECTION);
    }

    #[test]
    fn unknown_action_fails_before_reading() {
        let dir = tempdir().unwrap();
        let registry = ActionRegistry::builtin();
        let pool = WorkerPool::new(1).unwrap();
        let mut aliases = AliasResolver::default();
        let mut ctx = LoadContext {
            registry: &registry,
            pool: &pool,
            aliases: &mut aliases,
        };
        let def = definition("[[mutations.read]]\naction = 'explode'");
        let err = Document::open("x", &dir.path().join("gone.csv"), &def, &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::Engine(_)));
    }

    #[test]
    fn aliases_then_read_mutations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "amt.lcy,RRN\n10,001\n20,002\n").unwrap();

        let config = ProcessConfig::from_toml(
            r#"
[aliases]
amount = ["amt.lcy"]
[inputs.files.ledger]
[[inputs.files.ledger.mutations.read]]
action = "lowercase_columns"
[outputs.folders.out]
[job]
output = "out"
id_column = "id"
amount_column = "amount"
[[job.sides]]
name = "a"
sources = ["ledger"]
reconciled = "A R"
outstanding = "A O"
[[job.sides]]
name = "b"
sources = ["ledger"]
reconciled = "B R"
outstanding = "B O"
"#,
        )
        .unwrap();
        let mut aliases = config.alias_resolver().unwrap();
        let registry = ActionRegistry::builtin();
        let pool = WorkerPool::new(2).unwrap();
        let mut ctx = LoadContext {
            registry: &registry,
            pool: &pool,
            aliases: &mut aliases,
        };
        let (_, def) = config.inputs.get("ledger").unwrap();
        let doc = Document::open("ledger", &path, def, &mut ctx).unwrap();

        let table = doc.table().unwrap();
        assert_eq!(table.columns(), &["amount".to_string(), "rrn".to_string()][..]);
        let key = doc.alias_key().unwrap();
        assert_eq!(
            aliases.get_original(key, None),
            vec![("amt.lcy".to_string(), "amount".to_string())]
        );
        assert_eq!(table.value(1, "rrn"), Some(&Value::text("002")));
    }

    #[test]
    fn two_columns_aliased_to_one_name_fail_for_any_worker_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        fs::write(&path, "settlement_impact,amt.lcy,id\n1.004,10,a\n2,20,b\n3,30,c\n").unwrap();
        let def = definition(
            "[[mutations.read]]\naction = 'round_amount'\nparams = { column = 'amount' }",
        );
        let registry = ActionRegistry::builtin();

        for workers in [1, 2] {
            let pool = WorkerPool::new(workers).unwrap();
            let mut aliases = AliasResolver::new(BTreeMap::from([(
                "amount".to_string(),
                vec!["settlement_impact".to_string(), "amt.lcy".to_string()],
            )]))
            .unwrap();
            let mut ctx = LoadContext {
                registry: &registry,
                pool: &pool,
                aliases: &mut aliases,
            };
            let err = Document::open("mixed", &path, &def, &mut ctx).unwrap_err();
            match err {
                DocumentError::AliasCollision { column, first, second, .. } => {
                    assert_eq!(column, "amount");
                    assert_eq!(first, "settlement_impact");
                    assert_eq!(second, "amt.lcy");
                }
                other => panic!("workers={workers}: unexpected error {other}"),
            }
        }
    }

    #[test]
    fn sections_need_a_spreadsheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();
        let registry = ActionRegistry::builtin();
        let pool = WorkerPool::new(1).unwrap();
        let mut aliases = AliasResolver::default();
        let mut ctx = LoadContext {
            registry: &registry,
            pool: &pool,
            aliases: &mut aliases,
        };
        let def = definition("[sections.previous]");
        let err = Document::open("carry", &path, &def, &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::SectionsUnsupported { .. }));
    }

    #[test]
    fn spreadsheet_sections_fan_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("carry.xlsx");
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("current").unwrap();
        sheet.write_string(0, 0, "id").unwrap();
        sheet.write_string(1, 0, "C1").unwrap();
        let sheet = book.add_worksheet();
        sheet.set_name("previous").unwrap();
        sheet.write_string(0, 0, "id").unwrap();
        sheet.write_string(1, 0, "P1").unwrap();
        sheet.write_string(2, 0, "P2").unwrap();
        book.save(&path).unwrap();

        let registry = ActionRegistry::builtin();
        let pool = WorkerPool::new(1).unwrap();
        let mut aliases = AliasResolver::default();
        let mut ctx = LoadContext {
            registry: &registry,
            pool: &pool,
            aliases: &mut aliases,
        };
        let def = definition(
            "[sections.previous]\n[[sections.previous.mutations.read]]\naction = 'rename_columns'\nparams = { mapping = { id = 'ID' } }",
        );
        let mut doc = Document::open("carry", &path, &def, &mut ctx).unwrap();
        assert!(doc.is_sectioned());
        assert_eq!(doc.sections().len(), 1);
        let previous = doc.take_section("previous").unwrap();
        assert_eq!(previous.table().len(), 2);
        assert!(previous.table().has_column("ID"));
        assert!(doc.take_section("previous").is_err());

        let def = definition("[sections.absent]");
        assert!(matches!(
            Document::open("carry", &path, &def, &mut ctx),
            Err(DocumentError::MissingSection { .. })
        ));
    }
}
