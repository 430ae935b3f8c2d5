//! Fixed-size data-parallel worker pool.
//!
//! One pool is created per run and reused by every pipeline step and join
//! hook. A step is applied to disjoint contiguous row ranges; the driving
//! thread blocks until every chunk is back and concatenates them in range
//! order, so the result does not depend on scheduling.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::table::Table;

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("workers", &self.workers).finish()
    }
}

impl WorkerPool {
    /// A pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("docrecon-worker-{i}"))
            .build()
            .map_err(|e| EngineError::Pool(e.to_string()))?;
        debug!(workers, "worker pool started");
        Ok(Self { pool, workers })
    }

    /// A pool sized to the machine's available parallelism.
    pub fn with_available_parallelism() -> Result<Self> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to each chunk of `table` in parallel and reassemble in order.
    ///
    /// A table without rows is returned as is. Any chunk failure fails the
    /// whole call; no partial table is returned.
    pub fn map_chunks<F>(&self, table: Table, f: F) -> Result<Table>
    where
        F: Fn(Table) -> Result<Table> + Send + Sync,
    {
        if table.is_empty() {
            return Ok(table);
        }
        let ranges = chunk_ranges(table.len(), self.workers);
        if ranges.len() == 1 {
            return self.pool.install(|| f(table));
        }

        let source = &table;
        let parts = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| f(source.slice(range)))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(Table::concat(parts))
    }

    /// Apply `f` to the whole table as a single task on the pool.
    pub fn run_whole<F>(&self, table: Table, f: F) -> Result<Table>
    where
        F: FnOnce(Table) -> Result<Table> + Send,
    {
        self.pool.install(|| f(table))
    }

    /// Stop the pool's threads. Outstanding work has already been joined.
    pub fn shutdown(self) {
        debug!(workers = self.workers, "worker pool shut down");
        drop(self.pool);
    }
}

/// Split `len` rows into at most `workers` contiguous ranges covering every
/// row. The first `len % n` ranges carry one extra row.
pub fn chunk_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let n = workers.clamp(1, len);
    let base = len / n;
    let extra = len % n;

    let mut ranges = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}
