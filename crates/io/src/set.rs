//! Combining several documents into one.

use tracing::debug;

use docrecon_engine::{MutationPipeline, Table, WorkerPool};

use crate::document::Document;
use crate::error::Result;

/// Pipelines run around each append. Empty pipelines are no-ops.
#[derive(Debug, Clone, Default)]
pub struct JoinHooks {
    /// Applied to each incoming table before it is appended.
    pub on_before_join: MutationPipeline,
    /// Applied to the whole accumulated table after every append.
    pub on_join: MutationPipeline,
    /// Applied once to the final accumulated table.
    pub on_complete_join: MutationPipeline,
}

/// Accumulates documents into one table under a single name.
#[derive(Debug, Clone)]
pub struct DocumentSet {
    name: String,
    table: Table,
    alias_keys: Vec<String>,
    members: usize,
}

impl DocumentSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: Table::default(),
            alias_keys: Vec::new(),
            members: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents appended so far.
    pub fn members(&self) -> usize {
        self.members
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Alias substitution keys of the members, first-seen order, no repeats.
    pub fn alias_keys(&self) -> &[String] {
        &self.alias_keys
    }

    /// Append `others` in iteration order.
    ///
    /// Each incoming document first runs its own `join`-phase pipeline and
    /// then `on_before_join`, both named after that document. After every
    /// append `on_join` re-derives the entire accumulated table; once all are
    /// in, `on_complete_join` runs on the result.
    pub fn append<I>(&mut self, others: I, hooks: &JoinHooks, pool: &WorkerPool) -> Result<()>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut acc = std::mem::take(&mut self.table);
        for doc in others {
            let doc_name = doc.name().to_string();
            for key in doc.sections().iter().filter_map(|s| s.alias_key()) {
                if !self.alias_keys.iter().any(|k| k == key) {
                    self.alias_keys.push(key.to_string());
                }
            }
            let own_join = doc.join_pipeline().clone();

            let incoming = doc.into_table();
            let incoming = own_join.run(incoming, pool, &doc_name)?;
            let incoming = hooks.on_before_join.run(incoming, pool, &doc_name)?;
            let added = incoming.len();

            acc = hooks.on_join.run(acc.append(incoming), pool, &self.name)?;
            self.members += 1;
            debug!(set = %self.name, document = %doc_name, added, rows = acc.len(), "document appended");
        }
        self.table = hooks.on_complete_join.run(acc, pool, &self.name)?;
        Ok(())
    }

    /// The combined document; its table supersedes those of the members.
    pub fn into_document(self) -> Document {
        Document::from_table(&self.name, self.table)
    }
}
