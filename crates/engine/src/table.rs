//! Ordered, column-named record collections.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::value::Value;

/// Ordered sequence of records with named columns. No primary key.
///
/// Column names are unique. Every constructor and rename checks this, so
/// aligning tables by name in [`concat`](Table::concat) never merges two
/// distinct columns.
///
/// A `Table` handed to a pipeline step is never mutated by anyone else; steps
/// consume their input and return a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of one record.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table.column_index(column).and_then(|i| self.values.get(i))
    }

    /// Like [`get`](Self::get) but an absent column is an error.
    pub fn require(&self, column: &str) -> Result<&'a Value> {
        self.get(column)
            .ok_or_else(|| EngineError::MissingColumn(column.to_string()))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Table {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        check_unique(&columns)?;
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    }

    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        self.rows.get(index).map(|values| RowRef {
            table: self,
            values,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |values| RowRef {
            table: self,
            values,
        })
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a record given by column name. Unknown columns are added to the
    /// table (existing rows get `Empty`); missing ones are `Empty`.
    pub fn push_record(&mut self, record: &BTreeMap<String, Value>) {
        for name in record.keys() {
            self.ensure_column(name);
        }
        let row = self
            .columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or_default())
            .collect();
        self.rows.push(row);
    }

    /// Index of `name`, adding an `Empty`-filled column if absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Empty);
        }
        self.columns.len() - 1
    }

    /// Assign a whole column (added if absent). `values` must match the row count.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EngineError::RowWidth {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        let idx = self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = value;
        }
        Ok(())
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx])?;
        }
        Ok(())
    }

    /// Rename every column through `f`. Fails, leaving the table untouched,
    /// when two columns would end up with the same name.
    pub fn rename_columns<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(c)).collect();
        check_unique(&renamed)?;
        self.columns = renamed;
        Ok(())
    }

    /// Copy of a contiguous row range.
    pub fn slice(&self, range: Range<usize>) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows[range].to_vec(),
        }
    }

    /// Rows at `indices`, in the given order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(RowRef<'_>) -> bool,
    {
        let columns = std::mem::take(&mut self.columns);
        let view = Table {
            columns,
            rows: Vec::new(),
        };
        self.rows.retain(|values| keep(RowRef { table: &view, values }));
        self.columns = view.columns;
    }

    /// Split into `(matching, rest)`, each keeping original order.
    pub fn partition<F>(self, mut pred: F) -> (Table, Table)
    where
        F: FnMut(RowRef<'_>) -> bool,
    {
        let mut matching = Vec::new();
        let mut rest = Vec::new();
        for (i, values) in self.rows.iter().enumerate() {
            let row = RowRef {
                table: &self,
                values,
            };
            if pred(row) {
                matching.push(i);
            } else {
                rest.push(i);
            }
        }
        (self.take(&matching), self.take(&rest))
    }

    /// Projection onto `columns`, in that order.
    ///
    /// An empty table without some of the columns projects to an empty table
    /// with exactly `columns`; a non-empty one fails on the first absent column.
    pub fn select(&self, columns: &[String]) -> Result<Table> {
        check_unique(columns)?;
        if self.rows.is_empty() {
            return Table::new(columns.to_vec());
        }
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns: columns.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// Stable sort by the given columns, ascending.
    pub fn sort_by_columns(&mut self, columns: &[String]) -> Result<()> {
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>>>()?;
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].sort_cmp(&b[i]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(())
    }

    /// Concatenate tables in order, aligning by column name.
    ///
    /// The result has the union of all columns in first-seen order; fields a
    /// part does not have are `Empty`.
    pub fn concat(parts: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for part in &parts {
            for c in &part.columns {
                if !seen.contains_key(c) {
                    seen.insert(c.clone(), columns.len());
                    columns.push(c.clone());
                }
            }
        }

        let total: usize = parts.iter().map(Table::len).sum();
        let mut rows = Vec::with_capacity(total);
        for part in parts {
            if part.columns == columns {
                rows.extend(part.rows);
                continue;
            }
            let mapping: Vec<usize> = part.columns.iter().map(|c| seen[c]).collect();
            for row in part.rows {
                let mut aligned = vec![Value::Empty; columns.len()];
                for (value, &target) in row.into_iter().zip(&mapping) {
                    aligned[target] = value;
                }
                rows.push(aligned);
            }
        }
        Table { columns, rows }
    }

    /// Append `other` below `self` (see [`concat`](Self::concat)).
    pub fn append(self, other: Table) -> Table {
        if self.columns.is_empty() && self.rows.is_empty() {
            return other;
        }
        Table::concat(vec![self, other])
    }
}

fn check_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    match columns.iter().find(|c| !seen.insert(c.as_str())) {
        Some(dup) => Err(EngineError::DuplicateColumn(dup.clone())),
        None => Ok(()),
    }
}
