use std::collections::{HashMap, HashSet};

use docrecon_engine::{RowRef, Table, Value};

use crate::error::Result;

/// Rows whose key occurs once versus rows whose key repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateSplit {
    pub unique: Table,
    pub duplicates: Table,
}

/// Duplicate rows that cancel out, and the duplicates that remain.
#[derive(Debug, Clone, PartialEq)]
pub struct InversePairSplit {
    pub pairs: Table,
    pub remaining: Table,
}

/// One side's rows by membership of their identifier in the other side.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub reconciled: Table,
    pub unreconciled: Table,
}

fn key_of(row: RowRef<'_>, indices: &[usize]) -> Vec<String> {
    indices.iter().map(|&i| row.values()[i].render()).collect()
}

/// Sort by `key_columns`, then split rows whose key combination occurs more
/// than once from those whose key is unique. Empty keys compare equal.
pub fn split_duplicates(mut table: Table, key_columns: &[String]) -> Result<DuplicateSplit> {
    if table.is_empty() {
        return Ok(DuplicateSplit {
            duplicates: table.clone(),
            unique: table,
        });
    }
    table.sort_by_columns(key_columns)?;
    let indices = key_columns
        .iter()
        .map(|c| table.require_column(c))
        .collect::<docrecon_engine::Result<Vec<_>>>()?;

    let mut counts: HashMap<Vec<String>, usize> = HashMap::new();
    for row in table.iter() {
        *counts.entry(key_of(row, &indices)).or_default() += 1;
    }

    let (duplicates, unique) = table.partition(|row| counts[&key_of(row, &indices)] > 1);
    Ok(DuplicateSplit { unique, duplicates })
}

/// Whether a group of amounts is a posting and its reversal: exactly two
/// numeric amounts summing to zero.
pub fn is_inverse_pair(amounts: &[Option<f64>]) -> bool {
    match amounts {
        [Some(a), Some(b)] => a + b == 0.0,
        _ => false,
    }
}

/// Within `duplicates`, take out every identifier group that is an inverse
/// pair. Order is preserved on both sides.
pub fn split_inverse_pairs(duplicates: Table, id_column: &str, amount_column: &str) -> Result<InversePairSplit> {
    if duplicates.is_empty() {
        return Ok(InversePairSplit {
            pairs: duplicates.clone(),
            remaining: duplicates,
        });
    }
    let id_idx = duplicates.require_column(id_column)?;
    let amount_idx = duplicates.require_column(amount_column)?;

    let mut groups: HashMap<String, Vec<Option<f64>>> = HashMap::new();
    for row in duplicates.iter() {
        let values = row.values();
        groups
            .entry(values[id_idx].render())
            .or_default()
            .push(values[amount_idx].as_f64());
    }
    let qualifying: HashSet<String> = groups
        .into_iter()
        .filter(|(_, amounts)| is_inverse_pair(amounts))
        .map(|(id, _)| id)
        .collect();

    let (pairs, remaining) = duplicates.partition(|row| qualifying.contains(&row.values()[id_idx].render()));
    Ok(InversePairSplit { pairs, remaining })
}

/// Non-empty identifiers present in `table`.
pub fn ids(table: &Table, id_column: &str) -> Result<HashSet<String>> {
    if table.is_empty() {
        return Ok(HashSet::new());
    }
    Ok(table
        .column_values(id_column)?
        .into_iter()
        .filter(|v| !v.is_empty())
        .map(Value::render)
        .collect())
}

/// `reconciled(A) = { r in A : r.id in ids(B) }`, the rest unreconciled.
///
/// Pure membership: every row sharing an identifier lands on the same side.
/// Rows with an empty identifier never reconcile.
pub fn reconcile(a: Table, b: &Table, id_column: &str) -> Result<Reconciliation> {
    let other = ids(b, id_column)?;
    if a.is_empty() {
        return Ok(Reconciliation {
            reconciled: a.clone(),
            unreconciled: a,
        });
    }
    let idx = a.require_column(id_column)?;
    let (reconciled, unreconciled) = a.partition(|row| {
        let id = &row.values()[idx];
        !id.is_empty() && other.contains(&id.render())
    });
    Ok(Reconciliation {
        reconciled,
        unreconciled,
    })
}

/// Ascending by `amount_column`; a table without rows is returned as is.
pub fn sort_by_amount(mut table: Table, amount_column: &str) -> Result<Table> {
    if !table.is_empty() {
        table.sort_by_columns(&[amount_column.to_string()])?;
    }
    Ok(table)
}
