//! Mutation steps and the pipelines that run them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use docrecon_config::{ConfigValue, MutationSpec};

use crate::actions;
use crate::error::{EngineError, Result};
use crate::pool::WorkerPool;
use crate::table::Table;

/// Parameters handed to an action.
pub type Params = BTreeMap<String, ConfigValue>;

/// Key under which the owning document's name is passed to actions.
pub const REPORT_NAME: &str = "report_name";

type ActionFn = dyn Fn(Table, &Params) -> Result<Table> + Send + Sync;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// How an action is distributed over the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Row-local: applied to each chunk independently.
    Chunk,
    /// Needs every row at once (e.g. appends a summary row).
    Table,
}

/// A named pure transform.
#[derive(Clone)]
pub struct Action {
    name: String,
    scope: Scope,
    takes_params: bool,
    func: Arc<ActionFn>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("takes_params", &self.takes_params)
            .finish()
    }
}

impl Action {
    pub fn chunked<F>(name: &str, func: F) -> Self
    where
        F: Fn(Table, &Params) -> Result<Table> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            scope: Scope::Chunk,
            takes_params: true,
            func: Arc::new(func),
        }
    }

    pub fn whole_table<F>(name: &str, func: F) -> Self
    where
        F: Fn(Table, &Params) -> Result<Table> + Send + Sync + 'static,
    {
        Self {
            scope: Scope::Table,
            ..Self::chunked(name, func)
        }
    }

    /// An action that accepts no parameters; nothing is injected.
    pub fn without_params<F>(name: &str, func: F) -> Self
    where
        F: Fn(Table) -> Result<Table> + Send + Sync + 'static,
    {
        Self {
            takes_params: false,
            ..Self::chunked(name, move |t, _| func(t))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn takes_params(&self) -> bool {
        self.takes_params
    }

    /// Run directly on `table`, bypassing the pool.
    pub fn call(&self, table: Table, params: &Params) -> Result<Table> {
        (self.func)(table, params)
    }
}

/// Name → action lookup used to turn declared steps into runnable ones.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Action>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in action.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        actions::register_builtins(&mut registry);
        registry
    }

    /// Add or replace an action.
    pub fn register(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn step(&self, spec: &MutationSpec) -> Result<MutationStep> {
        let action = self
            .get(&spec.action)
            .ok_or_else(|| EngineError::UnknownAction(spec.action.clone()))?;
        Ok(MutationStep {
            action: action.clone(),
            params: spec.params.clone(),
        })
    }

    /// Resolve a declared list; fails on the first unknown action.
    pub fn pipeline(&self, specs: &[MutationSpec]) -> Result<MutationPipeline> {
        let steps = specs.iter().map(|s| self.step(s)).collect::<Result<Vec<_>>>()?;
        Ok(MutationPipeline { steps })
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MutationStep {
    action: Action,
    params: Params,
}

impl MutationStep {
    pub fn new(action: Action, params: Params) -> Self {
        Self { action, params }
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    /// Parameters as the action will see them for document `report_name`.
    pub fn effective_params(&self, report_name: &str) -> Params {
        let mut params = self.params.clone();
        if self.action.takes_params {
            params.insert(REPORT_NAME.to_string(), ConfigValue::string(report_name));
        }
        params
    }

    /// Apply on the pool: per chunk or whole-table according to the action.
    pub fn apply(&self, table: Table, pool: &WorkerPool, report_name: &str) -> Result<Table> {
        let params = self.effective_params(report_name);
        let action = &self.action;
        let result = match action.scope {
            Scope::Chunk => pool.map_chunks(table, |chunk| action.call(chunk, &params)),
            Scope::Table => pool.run_whole(table, |t| action.call(t, &params)),
        };
        result.map_err(|source| EngineError::Step {
            step: action.name.clone(),
            report: report_name.to_string(),
            source: Box::new(source),
        })
    }

    /// Apply on the calling thread without chunking.
    pub fn apply_sequential(&self, table: Table, report_name: &str) -> Result<Table> {
        let params = self.effective_params(report_name);
        self.action.call(table, &params)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered steps with a full barrier between consecutive steps.
#[derive(Debug, Clone, Default)]
pub struct MutationPipeline {
    steps: Vec<MutationStep>,
}

impl MutationPipeline {
    pub fn new(steps: Vec<MutationStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[MutationStep] {
        &self.steps
    }

    /// Run every step in declaration order; each replaces the table.
    pub fn run(&self, mut table: Table, pool: &WorkerPool, report_name: &str) -> Result<Table> {
        for step in &self.steps {
            let before = table.len();
            table = step.apply(table, pool, report_name)?;
            debug!(
                report = report_name,
                step = step.name(),
                rows_in = before,
                rows_out = table.len(),
                "mutation step applied"
            );
        }
        Ok(table)
    }
}
