//! Per-row value generators for derived columns.
//!
//! Declared in configuration as tagged tables:
//!
//! ```toml
//! generator = { kind = "template", template = "RRN {rrn} AUTH {auth_id}" }
//! generator = { kind = "concat", columns = ["rrn", "terminal_id"] }
//! generator = { kind = "slice", column = "unique_id", start = 2, end = 8 }
//! ```

use serde::Deserialize;

use docrecon_config::ConfigValue;

use crate::error::{EngineError, Result};
use crate::table::RowRef;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    /// The same value on every row.
    Constant { value: ConfigValue },
    /// `{column}` placeholders replaced by rendered fields; `{{`/`}}` escape.
    /// Empty fields render as nothing.
    Template { template: String },
    /// Non-empty fields joined with `separator`.
    Concat {
        columns: Vec<String>,
        #[serde(default)]
        separator: String,
    },
    /// Character range of one rendered field.
    Slice {
        column: String,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        end: Option<usize>,
    },
    /// `then` when every listed column is non-empty, otherwise `otherwise`.
    WhenPresent {
        columns: Vec<String>,
        then: Box<Generator>,
        otherwise: Box<Generator>,
    },
}

impl Generator {
    pub fn from_config(action: &str, value: &ConfigValue) -> Result<Self> {
        let generator: Generator = value
            .deserialize()
            .map_err(|e| EngineError::invalid_param(action, "generator", e.to_string()))?;
        generator.check(action)?;
        Ok(generator)
    }

    fn check(&self, action: &str) -> Result<()> {
        match self {
            Generator::Template { template } => parse_template(template)
                .map(|_| ())
                .map_err(|reason| EngineError::invalid_param(action, "generator", reason)),
            Generator::Slice { start, end: Some(end), .. } if end < start => Err(
                EngineError::invalid_param(action, "generator", "slice end before start"),
            ),
            Generator::WhenPresent { then, otherwise, .. } => {
                then.check(action)?;
                otherwise.check(action)
            }
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, row: RowRef<'_>) -> Result<Value> {
        match self {
            Generator::Constant { value } => Ok(Value::from(value)),
            Generator::Template { template } => {
                let mut out = String::new();
                let segments = parse_template(template)
                    .map_err(|reason| EngineError::invalid_param("template", "template", reason))?;
                for segment in segments {
                    match segment {
                        Segment::Literal(s) => out.push_str(&s),
                        Segment::Field(name) => out.push_str(&row.require(&name)?.render()),
                    }
                }
                Ok(Value::Text(out))
            }
            Generator::Concat { columns, separator } => {
                let mut parts = Vec::with_capacity(columns.len());
                for column in columns {
                    let value = row.require(column)?;
                    if !value.is_empty() {
                        parts.push(value.render());
                    }
                }
                Ok(Value::from_input(&parts.join(separator)))
            }
            Generator::Slice { column, start, end } => {
                let rendered = row.require(column)?.render();
                let chars = rendered.chars().skip(*start);
                let sliced: String = match end {
                    Some(end) => chars.take(end.saturating_sub(*start)).collect(),
                    None => chars.collect(),
                };
                Ok(Value::from_input(&sliced))
            }
            Generator::WhenPresent {
                columns,
                then,
                otherwise,
            } => {
                let mut present = true;
                for column in columns {
                    if row.require(column)?.is_empty() {
                        present = false;
                        break;
                    }
                }
                if present {
                    then.evaluate(row)
                } else {
                    otherwise.evaluate(row)
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Field(String),
}

fn parse_template(template: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(format!("unclosed placeholder in '{template}'")),
                    }
                }
                if name.is_empty() {
                    return Err(format!("empty placeholder in '{template}'"));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name));
            }
            '}' => return Err(format!("unmatched '}}' in '{template}'")),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
