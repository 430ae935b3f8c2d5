//! Built-in mutation actions.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use docrecon_config::{ColumnType, ConfigValue};

use crate::dates::{self, DEFAULT_DATE_FORMAT};
use crate::error::{EngineError, Result};
use crate::generators::Generator;
use crate::pipeline::{Action, ActionRegistry, Params, REPORT_NAME};
use crate::table::Table;
use crate::value::Value;

pub const DEFAULT_TOTAL_LABEL: &str = "SETTLEMENT FIGURE {report} REPORT {timestamp}";
pub const DEFAULT_TOTAL_MARKER: &str = "Special_Case";

pub(crate) fn register_builtins(registry: &mut ActionRegistry) {
    registry.register(Action::chunked("derive_column", derive_column));
    registry.register(Action::chunked("format_dates", format_dates));
    registry.register(Action::chunked("filter_rows", filter_rows));
    registry.register(Action::chunked("select_columns", select_columns));
    registry.register(Action::chunked("rename_columns", rename_columns));
    registry.register(Action::without_params("lowercase_columns", lowercase_columns));
    registry.register(Action::chunked("round_amount", round_amount));
    registry.register(Action::whole_table("append_row", append_row));
    registry.register(Action::whole_table("append_total_row", append_total_row));
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

fn first_of<'a>(params: &'a Params, keys: &[&str]) -> Option<&'a ConfigValue> {
    keys.iter().find_map(|k| params.get(*k))
}

/// String parameter under any of `keys` (first is the canonical name).
fn opt_str<'a>(params: &'a Params, action: &str, keys: &[&str]) -> Result<Option<&'a str>> {
    match first_of(params, keys) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| EngineError::invalid_param(action, keys[0], "expected a string")),
    }
}

fn req_str<'a>(params: &'a Params, action: &str, keys: &[&str]) -> Result<&'a str> {
    opt_str(params, action, keys)?
        .ok_or_else(|| EngineError::invalid_param(action, keys[0], "required"))
}

fn opt_list(params: &Params, action: &str, key: &str) -> Result<Option<Vec<String>>> {
    match params.get(key) {
        None => Ok(None),
        Some(ConfigValue::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                ConfigValue::Scalar(s) => Ok(s.to_string()),
                _ => Err(EngineError::invalid_param(action, key, "expected a list of scalars")),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(_) => Err(EngineError::invalid_param(action, key, "expected a list")),
    }
}

fn opt_mapping<'a>(
    params: &'a Params,
    action: &str,
    key: &str,
) -> Result<Option<&'a BTreeMap<String, ConfigValue>>> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_mapping()
            .map(Some)
            .ok_or_else(|| EngineError::invalid_param(action, key, "expected a table")),
    }
}

fn report_name(params: &Params) -> &str {
    params.get(REPORT_NAME).and_then(ConfigValue::as_str).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Row-local actions
// ---------------------------------------------------------------------------

/// `{ column, generator }`: compute one column per row.
fn derive_column(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "derive_column";
    let column = req_str(params, ACTION, &["column", "col_name"])?;
    let spec = params
        .get("generator")
        .ok_or_else(|| EngineError::invalid_param(ACTION, "generator", "required"))?;
    let generator = Generator::from_config(ACTION, spec)?;

    let values = table
        .iter()
        .map(|row| generator.evaluate(row))
        .collect::<Result<Vec<_>>>()?;
    table.set_column(column, values)?;
    Ok(table)
}

/// `{ column | columns, format }`: rewrite dates in one canonical layout.
fn format_dates(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "format_dates";
    let columns = match opt_list(params, ACTION, "columns")? {
        Some(columns) => columns,
        None => vec![req_str(params, ACTION, &["column", "col_name"])?.to_string()],
    };
    let format = opt_str(params, ACTION, &["format", "dt_format"])?.unwrap_or(DEFAULT_DATE_FORMAT);

    for column in &columns {
        table.map_column(column, |v| dates::reformat(v, format, column))?;
    }
    Ok(table)
}

/// `{ column, include?, exclude? }`: keep rows whose rendered field is in
/// `include` and not in `exclude`.
fn filter_rows(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "filter_rows";
    let column = req_str(params, ACTION, &["column", "col_name"])?;
    let include: Option<HashSet<String>> =
        opt_list(params, ACTION, "include")?.map(|v| v.into_iter().collect());
    let exclude: Option<HashSet<String>> =
        opt_list(params, ACTION, "exclude")?.map(|v| v.into_iter().collect());
    if include.is_none() && exclude.is_none() {
        return Err(EngineError::invalid_param(
            ACTION,
            "include",
            "one of 'include' or 'exclude' is required",
        ));
    }

    let idx = table.require_column(column)?;
    table.retain(|row| {
        let field = row.values()[idx].render();
        let allowed = include.as_ref().map_or(true, |set| set.contains(&field));
        let denied = exclude.as_ref().is_some_and(|set| set.contains(&field));
        allowed && !denied
    });
    Ok(table)
}

/// `{ columns }`: project onto the listed columns in that order.
fn select_columns(table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "select_columns";
    let columns = opt_list(params, ACTION, "columns")?
        .ok_or_else(|| EngineError::invalid_param(ACTION, "columns", "required"))?;
    table.select(&columns)
}

/// `{ mapping = { from = "to" } }`
fn rename_columns(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "rename_columns";
    let mapping = opt_mapping(params, ACTION, "mapping")?
        .ok_or_else(|| EngineError::invalid_param(ACTION, "mapping", "required"))?;
    let mut renames = BTreeMap::new();
    for (from, to) in mapping {
        let to = to
            .as_str()
            .ok_or_else(|| EngineError::invalid_param(ACTION, "mapping", format!("'{from}' must map to a string")))?;
        renames.insert(from.as_str(), to);
    }
    table.rename_columns(|c| renames.get(c).map_or_else(|| c.to_string(), |to| to.to_string()))?;
    Ok(table)
}

fn lowercase_columns(mut table: Table) -> Result<Table> {
    table.rename_columns(str::to_lowercase)?;
    Ok(table)
}

/// `{ column, places = 2 }`
fn round_amount(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "round_amount";
    let column = req_str(params, ACTION, &["column", "col_name"])?;
    let places = match params.get("places") {
        None => 2,
        Some(v) => v
            .as_i64()
            .filter(|p| (0..=12).contains(p))
            .ok_or_else(|| EngineError::invalid_param(ACTION, "places", "expected an integer in 0..=12"))?,
    };
    let factor = 10f64.powi(places as i32);

    table.map_column(column, |v| {
        if v.is_empty() {
            return Ok(Value::Empty);
        }
        let n = v.as_f64().ok_or_else(|| EngineError::Coerce {
            column: column.to_string(),
            value: v.render(),
            expected: ColumnType::Number,
        })?;
        Ok(Value::Number((n * factor).round() / factor))
    })?;
    Ok(table)
}

// ---------------------------------------------------------------------------
// Whole-table actions
// ---------------------------------------------------------------------------

/// `{ row = { column = value } }`: append one literal row.
fn append_row(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "append_row";
    let row = opt_mapping(params, ACTION, "row")?
        .ok_or_else(|| EngineError::invalid_param(ACTION, "row", "required"))?;
    let record: BTreeMap<String, Value> = row.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect();
    table.push_record(&record);
    Ok(table)
}

/// Settlement-figure row: the sum of `amount_column` over every row, labelled
/// with the report name and the timestamp of the last row.
///
/// Params: `amount_column` (required), `timestamp_column`, `label_column`,
/// `label` (template with `{report}` and `{timestamp}`), `marker_column`,
/// `marker`, `carry_columns` (copied from the last row), `fields` (literals).
///
/// A table without rows gets no total row.
fn append_total_row(mut table: Table, params: &Params) -> Result<Table> {
    const ACTION: &str = "append_total_row";
    let amount_column = req_str(params, ACTION, &["amount_column"])?;
    let timestamp_column = opt_str(params, ACTION, &["timestamp_column"])?;
    let label_column = opt_str(params, ACTION, &["label_column"])?;
    let label_template = opt_str(params, ACTION, &["label"])?.unwrap_or(DEFAULT_TOTAL_LABEL);
    let marker_column = opt_str(params, ACTION, &["marker_column"])?;
    let marker = opt_str(params, ACTION, &["marker"])?.unwrap_or(DEFAULT_TOTAL_MARKER);
    let carry_columns = opt_list(params, ACTION, "carry_columns")?.unwrap_or_default();
    let fields = opt_mapping(params, ACTION, "fields")?;
    let report = report_name(params);

    if table.is_empty() {
        debug!(report, "no rows, total row skipped");
        return Ok(table);
    }

    let mut total = 0.0;
    for value in table.column_values(amount_column)? {
        if value.is_empty() {
            continue;
        }
        total += value.as_f64().ok_or_else(|| EngineError::Coerce {
            column: amount_column.to_string(),
            value: value.render(),
            expected: ColumnType::Number,
        })?;
    }

    let last = table.len() - 1;
    let timestamp = match timestamp_column {
        Some(column) => {
            table.require_column(column)?;
            table.value(last, column).map(Value::render).unwrap_or_default()
        }
        None => String::new(),
    };

    let mut record: BTreeMap<String, Value> = BTreeMap::new();
    for column in &carry_columns {
        table.require_column(column)?;
        let value = table.value(last, column).cloned().unwrap_or_default();
        record.insert(column.clone(), value);
    }
    if let Some(fields) = fields {
        for (k, v) in fields {
            record.insert(k.clone(), Value::from(v));
        }
    }
    if let Some(column) = label_column {
        let label = label_template
            .replace("{report}", &report.to_uppercase())
            .replace("{timestamp}", &timestamp);
        record.insert(column.to_string(), Value::Text(label.trim().to_string()));
    }
    if let Some(column) = marker_column {
        record.insert(column.to_string(), Value::text(marker));
    }
    record.insert(amount_column.to_string(), Value::Number(total));

    debug!(report, total, rows = table.len(), "total row appended");
    table.push_record(&record);
    Ok(table)
}
