//! Raw records → typed tables, shared by every reader.
//!
//! Reading is two-pass. [`scan_header`] walks records only up to the header
//! row and resolves which declared columns the source actually has;
//! [`tabulate`] then reads the data rows restricted to that layout.

use std::collections::HashSet;

use tracing::debug;

use docrecon_config::{ColumnType, ReadOptions};
use docrecon_engine::{Table, Value};

use crate::error::Result;

/// Columns to keep: source field index, column name, declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    fields: Vec<(usize, String, Option<ColumnType>)>,
}

impl Layout {
    /// Restrict `header` to the declared columns, matched case-insensitively.
    /// Without declared columns every header field is kept, untyped.
    pub fn resolve(header: &[String], options: &ReadOptions) -> Self {
        let Some(ref declared) = options.columns else {
            return Self {
                fields: header
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (i, name.trim().to_string(), None))
                    .collect(),
            };
        };

        let mut fields = Vec::new();
        let mut found = HashSet::new();
        for (i, name) in header.iter().enumerate() {
            let name = name.trim();
            let lower = name.to_lowercase();
            let ty = declared
                .iter()
                .find(|(d, _)| d.to_lowercase() == lower)
                .map(|(d, ty)| (d.as_str(), *ty));
            if let Some((declared_name, ty)) = ty {
                if found.insert(declared_name) {
                    fields.push((i, name.to_string(), Some(ty)));
                }
            }
        }
        for name in declared.keys() {
            if !found.contains(name.as_str()) {
                debug!(column = %name, "declared column absent from source");
            }
        }
        Self { fields }
    }

    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|(_, name, _)| name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn row(&self, record: &[String]) -> docrecon_engine::Result<Vec<Value>> {
        self.fields
            .iter()
            .map(|(i, name, ty)| {
                let raw = record.get(*i).map(String::as_str).unwrap_or("");
                match ty {
                    Some(ty) => Value::parse(raw, *ty, name),
                    None => Ok(Value::from_input(raw)),
                }
            })
            .collect()
    }
}

/// Records with the configured raw indices removed, paired with their
/// position among the kept records.
fn kept<I>(records: I, options: &ReadOptions) -> impl Iterator<Item = (usize, Result<Vec<String>>)>
where
    I: Iterator<Item = Result<Vec<String>>>,
{
    let skip: HashSet<usize> = options.skip_rows.iter().copied().collect();
    records
        .enumerate()
        .filter(move |(raw, _)| !skip.contains(raw))
        .map(|(_, record)| record)
        .enumerate()
}

/// First pass: the header record, or `None` when the source ends before it.
pub fn scan_header<I>(records: I, options: &ReadOptions) -> Result<Option<Vec<String>>>
where
    I: Iterator<Item = Result<Vec<String>>>,
{
    for (pos, record) in kept(records, options) {
        let record = record?;
        if pos == options.header {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Second pass: data rows after the header, typed per `layout`, delivered in
/// chunks of `chunk_size` rows (one chunk when unset). At least one chunk is
/// always delivered so the schema survives a source without data rows.
pub fn tabulate<I, F>(records: I, options: &ReadOptions, layout: &Layout, mut on_chunk: F) -> Result<()>
where
    I: Iterator<Item = Result<Vec<String>>>,
    F: FnMut(Table) -> Result<()>,
{
    let chunk_size = options.chunk_size.filter(|n| *n > 0).unwrap_or(usize::MAX);
    let columns = layout.columns();
    let mut chunk = Table::new(columns.clone())?;
    let mut delivered = 0usize;

    for (pos, record) in kept(records, options) {
        if pos <= options.header {
            continue;
        }
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        chunk.push_row(layout.row(&record)?)?;
        if chunk.len() >= chunk_size {
            on_chunk(std::mem::replace(&mut chunk, Table::new(columns.clone())?))?;
            delivered += 1;
        }
    }
    if !chunk.is_empty() || delivered == 0 {
        on_chunk(chunk)?;
    }
    Ok(())
}

/// Both passes, chunks appended in arrival order.
pub fn read_records<I, M>(make_records: M, options: &ReadOptions) -> Result<Table>
where
    I: Iterator<Item = Result<Vec<String>>>,
    M: Fn() -> I,
{
    let Some(header) = scan_header(make_records(), options)? else {
        return Ok(Table::default());
    };
    let layout = Layout::resolve(&header, options);

    let mut table: Option<Table> = None;
    let mut chunks = 0usize;
    tabulate(make_records(), options, &layout, |chunk| {
        chunks += 1;
        table = Some(match table.take() {
            Some(acc) => acc.append(chunk),
            None => chunk,
        });
        Ok(())
    })?;
    debug!(chunks, "records tabulated");
    Ok(table.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn records(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
    }

    fn read(rows: &[Vec<String>], options: &ReadOptions) -> Table {
        read_records(|| rows.iter().cloned().map(Ok), options).unwrap()
    }

    #[test]
    fn header_after_skipped_rows() {
        let rows = records(&[
            &["Report generated 2024-03-01"],
            &["RRN", "Amount"],
            &["1", "10.5"],
            &["2", "3"],
        ]);
        let options = ReadOptions {
            skip_rows: vec![0],
            ..Default::default()
        };
        let t = read(&rows, &options);
        assert_eq!(t.columns(), &["RRN".to_string(), "Amount".to_string()][..]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.value(0, "Amount"), Some(&Value::text("10.5")));
    }

    #[test]
    fn declared_columns_case_insensitive_and_optional() {
        let rows = records(&[&["rrn", "AMOUNT", "Narrative"], &["00123", "1,000.50", "x"]]);
        let options = ReadOptions {
            columns: Some(BTreeMap::from([
                ("RRN".to_string(), ColumnType::Text),
                ("amount".to_string(), ColumnType::Number),
                ("terminal".to_string(), ColumnType::Text),
            ])),
            ..Default::default()
        };
        let t = read(&rows, &options);
        assert_eq!(t.columns(), &["rrn".to_string(), "AMOUNT".to_string()][..]);
        assert_eq!(t.value(0, "rrn"), Some(&Value::text("00123")));
        assert_eq!(t.value(0, "AMOUNT"), Some(&Value::Number(1000.5)));
    }

    #[test]
    fn chunks_arrive_in_order() {
        let rows = records(&[&["n"], &["1"], &["2"], &["3"], &["4"], &["5"]]);
        let options = ReadOptions {
            chunk_size: Some(2),
            ..Default::default()
        };
        let layout = Layout::resolve(&rows[0], &options);
        let mut sizes = Vec::new();
        tabulate(rows.iter().cloned().map(Ok), &options, &layout, |c| {
            sizes.push(c.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(sizes, vec![2, 2, 1]);

        let t = read(&rows, &options);
        let got: Vec<String> = t.iter().map(|r| r.get("n").unwrap().render()).collect();
        assert_eq!(got, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn header_only_keeps_schema() {
        let rows = records(&[&["a", "b"]]);
        let t = read(&rows, &ReadOptions::default());
        assert!(t.is_empty());
        assert_eq!(t.width(), 2);
    }

    #[test]
    fn short_records_pad_with_empty() {
        let rows = records(&[&["a", "b"], &["1"]]);
        let t = read(&rows, &ReadOptions::default());
        assert_eq!(t.value(0, "b"), Some(&Value::Empty));
    }

    #[test]
    fn repeated_header_is_an_error() {
        let rows = records(&[&["id", "amt", "id"], &["1", "2", "3"]]);
        let err = read_records(|| rows.iter().cloned().map(Ok), &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::DocumentError::Engine(docrecon_engine::EngineError::DuplicateColumn(c)) if c == "id"
        ));
    }

    #[test]
    fn bad_typed_field_is_an_error() {
        let rows = records(&[&["amt"], &["abc"]]);
        let options = ReadOptions {
            columns: Some(BTreeMap::from([("amt".to_string(), ColumnType::Number)])),
            ..Default::default()
        };
        assert!(read_records(|| rows.iter().cloned().map(Ok), &options).is_err());
    }
}
