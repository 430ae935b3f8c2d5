// Delimited text sources (CSV, TSV, pipe, semicolon)

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use docrecon_config::ReadOptions;
use docrecon_engine::Table;

use crate::error::{DocumentError, Result};
use crate::layout;

/// Read a delimited file into a table, honoring `options`.
///
/// The delimiter is sniffed when not configured.
pub fn read(path: &Path, options: &ReadOptions) -> Result<Table> {
    let content = read_file_as_utf8(path)?;
    let delimiter = match options.delimiter {
        Some(c) if c.is_ascii() => c as u8,
        Some(c) => {
            return Err(DocumentError::ReadOption(format!(
                "delimiter '{c}' is not a single-byte character"
            )))
        }
        None => sniff_delimiter(&content, options),
    };

    let make_records = || records(&content, delimiter, path);
    layout::read_records(make_records, options)
}

fn records<'a>(
    content: &'a str,
    delimiter: u8,
    path: &'a Path,
) -> impl Iterator<Item = Result<Vec<String>>> + 'a {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .into_records()
        .map(move |r| {
            r.map(|record| record.iter().map(str::to_string).collect())
                .map_err(|e| DocumentError::Delimited {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
        })
}

/// Lines inspected when guessing the delimiter.
const SNIFF_LINES: usize = 10;

/// Guess the field delimiter from the header line and the lines after it.
///
/// Lines listed in `skip_rows` and those before the header are ignored, so
/// a report banner does not vote. Among tab, semicolon, comma and pipe, a
/// candidate must split the header into more than one field. Candidates are
/// ranked first by how many header fields name a declared column, then by
/// how many lines agree with the header's field count, weighted by that
/// count. Falls back to comma.
pub fn sniff_delimiter(content: &str, options: &ReadOptions) -> u8 {
    const CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];

    let skip: HashSet<usize> = options.skip_rows.iter().copied().collect();
    let sample: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| !skip.contains(i))
        .map(|(_, line)| line)
        .skip(options.header)
        .take(SNIFF_LINES)
        .collect();
    let declared: HashSet<String> = options
        .columns
        .iter()
        .flat_map(|cols| cols.keys().map(|c| c.to_lowercase()))
        .collect();

    let mut best = b',';
    let mut best_score = (0usize, 0usize);
    for delim in CANDIDATES {
        let mut lines = sample.iter().map(|line| split_line(line, delim));
        let Some(header) = lines.next() else { break };
        if header.len() <= 1 {
            continue;
        }
        let named = header
            .iter()
            .filter(|f| declared.contains(&f.trim().to_lowercase()))
            .count();
        let agreeing = 1 + lines.filter(|fields| fields.len() == header.len()).count();
        let score = (named, agreeing * header.len());
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|r| r.iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Read file and convert to UTF-8 if needed (Windows-1252 exports are common)
pub fn read_file_as_utf8(path: &Path) -> Result<String> {
    let io_err = |source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(io_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s)),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Write `table` with a header row. Parent directories must exist.
pub fn write(table: &Table, path: &Path) -> Result<()> {
    write_with_delimiter(table, path, b',')
}

pub fn write_with_delimiter(table: &Table, path: &Path, delimiter: u8) -> Result<()> {
    let write_err = |e: csv::Error| DocumentError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(write_err)?;

    writer.write_record(table.columns()).map_err(write_err)?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|v| v.render()))
            .map_err(write_err)?;
    }
    writer.flush().map_err(|e| DocumentError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    use docrecon_config::ColumnType;
    use docrecon_engine::Value;

    fn sniff(content: &str) -> u8 {
        sniff_delimiter(content, &ReadOptions::default())
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff("rrn;amount;date\n1;10;x\n2;20;y\n"), b';');
        assert_eq!(sniff("rrn,amount,date\n1,10,x\n2,20,y\n"), b',');
        assert_eq!(sniff("rrn|amount|date\n1|10|x\n2|20|y\n"), b'|');
        assert_eq!(sniff("rrn\tamount\n1\t10\n"), b'\t');
        assert_eq!(sniff("single\n1\n"), b',');
        assert_eq!(sniff(""), b',');
    }

    #[test]
    fn quoted_commas_do_not_vote() {
        let content = "id;narrative;amount\n1;\"cash, branch 4\";10\n2;\"fee, monthly\";2\n";
        assert_eq!(sniff(content), b';');
    }

    #[test]
    fn banner_rows_are_skipped() {
        // the banner has more commas than the data has pipes
        let content = "Ledger, branch 12, generated 2024-03-01, page 1\nid|amount\n1|10\n2|20\n";
        assert_eq!(sniff(content), b',');
        let options = ReadOptions {
            skip_rows: vec![0],
            ..Default::default()
        };
        assert_eq!(sniff_delimiter(content, &options), b'|');
    }

    #[test]
    fn header_row_offset_is_honoured() {
        let content = "exported by: ops; batch 7\nid,amount\n1,10\n";
        let options = ReadOptions {
            header: 1,
            ..Default::default()
        };
        assert_eq!(sniff_delimiter(content, &options), b',');
    }

    #[test]
    fn declared_columns_break_ties() {
        // both ';' and ',' split every line in two
        let content = "a;b,c\n1;2,3\n";
        assert_eq!(sniff(content), b';');
        let options = ReadOptions {
            columns: Some(BTreeMap::from([
                ("A;B".to_string(), ColumnType::Text),
                ("c".to_string(), ColumnType::Text),
            ])),
            ..Default::default()
        };
        assert_eq!(sniff_delimiter(content, &options), b',');
    }

    #[test]
    fn banner_file_reads_without_configured_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gl.csv");
        fs::write(&path, "GL export, all branches, 2024\nid|amount\nR1|10\n").unwrap();
        let options = ReadOptions {
            skip_rows: vec![0],
            ..Default::default()
        };
        let table = read(&path, &options).unwrap();
        assert_eq!(table.columns(), &["id".to_string(), "amount".to_string()][..]);
        assert_eq!(table.value(0, "id"), Some(&Value::text("R1")));
    }

    #[test]
    fn test_read_pipe_with_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "RRN|AMT.LCY|NARRATIVE\n000123|1,250.00|cash\n000124|-3|\n").unwrap();

        let options = ReadOptions {
            delimiter: Some('|'),
            columns: Some(BTreeMap::from([
                ("rrn".to_string(), ColumnType::Text),
                ("amt.lcy".to_string(), ColumnType::Number),
            ])),
            ..Default::default()
        };
        let table = read(&path, &options).unwrap();
        assert_eq!(table.columns(), &["RRN".to_string(), "AMT.LCY".to_string()][..]);
        assert_eq!(table.value(0, "RRN"), Some(&Value::text("000123")));
        assert_eq!(table.value(0, "AMT.LCY"), Some(&Value::Number(1250.0)));
        assert_eq!(table.value(1, "AMT.LCY"), Some(&Value::Number(-3.0)));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        fs::write(&path, b"name,city\nJos\xe9,Z\xfcrich\n").unwrap();
        let table = read(&path, &ReadOptions::default()).unwrap();
        assert_eq!(table.value(0, "name"), Some(&Value::text("José")));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read(&dir.path().join("nope.csv"), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn test_write_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = Table::from_rows(
            vec!["id".into(), "amount".into()],
            vec![
                vec![Value::text("R1, quoted"), Value::Number(100.0)],
                vec![Value::text("R2"), Value::Empty],
            ],
        )
        .unwrap();
        write(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,amount\n\"R1, quoted\",100\nR2,\n");

        let back = read(&path, &ReadOptions::default()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.value(0, "id"), Some(&Value::text("R1, quoted")));
    }
}
