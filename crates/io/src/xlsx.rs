// Spreadsheet sources (xlsx, xls, xlsb, ods), one section per sheet

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{NaiveDate, TimeDelta};
use tracing::debug;

use docrecon_config::ReadOptions;
use docrecon_engine::Table;

use crate::error::{DocumentError, Result};
use crate::layout;

/// Extensions opened through the spreadsheet reader.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// An opened workbook; sheets are read on demand.
pub struct Workbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        let sheets = open_workbook_auto(path).map_err(|e| DocumentError::Spreadsheet {
            path: path.to_path_buf(),
            message: format!("failed to open workbook: {e}"),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names().to_vec()
    }

    /// Read one sheet into a table.
    pub fn read_sheet(&mut self, sheet: &str, options: &ReadOptions) -> Result<Table> {
        let range = self
            .sheets
            .worksheet_range(sheet)
            .map_err(|e| DocumentError::Spreadsheet {
                path: self.path.clone(),
                message: format!("failed to read sheet '{sheet}': {e}"),
            })?;
        let (height, width) = range.get_size();
        debug!(path = %self.path.display(), sheet, height, width, "sheet loaded");

        let make_records = || rows(&range);
        layout::read_records(make_records, options)
    }

    /// Read the first sheet; an empty workbook yields an empty table.
    pub fn read_first(&mut self, options: &ReadOptions) -> Result<Table> {
        match self.sheet_names().first() {
            Some(name) => {
                let name = name.clone();
                self.read_sheet(&name, options)
            }
            None => Ok(Table::default()),
        }
    }
}

fn rows(range: &Range<Data>) -> impl Iterator<Item = Result<Vec<String>>> + '_ {
    range
        .rows()
        .map(|row| Ok(row.iter().map(cell_text).collect()))
}

/// Raw text of one cell, as a delimited export would carry it.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{e:?}"),
        Data::DateTime(dt) => serial_to_text(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Excel serial date (1900 system) to `YYYY-MM-DD[ HH:MM:SS]`.
pub fn serial_to_text(serial: f64) -> String {
    let millis = (serial * 86_400_000.0).round() as i64;
    let datetime = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .zip(TimeDelta::try_milliseconds(millis))
        .and_then(|(epoch, delta)| epoch.checked_add_signed(delta));
    match datetime {
        Some(dt) if serial.fract() == 0.0 => dt.format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{serial}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrecon_engine::Value;
    use tempfile::tempdir;

    #[test]
    fn serial_dates() {
        assert_eq!(serial_to_text(45352.0), "2024-03-01");
        assert_eq!(serial_to_text(45352.5), "2024-03-01 12:00:00");
    }

    #[test]
    fn extension_detection() {
        assert!(is_spreadsheet(Path::new("a/B.XLSX")));
        assert!(!is_spreadsheet(Path::new("a/b.csv")));
        assert!(!is_spreadsheet(Path::new("a/noext")));
    }

    #[test]
    fn reads_named_sheets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("current").unwrap();
        sheet.write_string(0, 0, "transaction_id").unwrap();
        sheet.write_string(0, 1, "Amount").unwrap();
        sheet.write_string(1, 0, "R1").unwrap();
        sheet.write_number(1, 1, 12.5).unwrap();
        let sheet = book.add_worksheet();
        sheet.set_name("previous").unwrap();
        sheet.write_string(0, 0, "transaction_id").unwrap();
        sheet.write_string(1, 0, "R0").unwrap();
        book.save(&path).unwrap();

        let mut wb = Workbook::open(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["current".to_string(), "previous".to_string()]);

        let current = wb.read_sheet("current", &ReadOptions::default()).unwrap();
        assert_eq!(current.value(0, "Amount"), Some(&Value::text("12.5")));
        let previous = wb.read_sheet("previous", &ReadOptions::default()).unwrap();
        assert_eq!(previous.value(0, "transaction_id"), Some(&Value::text("R0")));
        assert!(wb.read_sheet("missing", &ReadOptions::default()).is_err());
    }
}
