use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use docrecon_config::{ColumnType, ConfigValue, Scalar};

use crate::error::{EngineError, Result};

/// A single typed field of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Value {
    /// Coerce a raw field to the declared column type. Blank input is `Empty`.
    pub fn parse(raw: &str, ty: ColumnType, column: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Value::Empty);
        }
        let coerce_err = || EngineError::Coerce {
            column: column.to_string(),
            value: raw.to_string(),
            expected: ty,
        };
        match ty {
            ColumnType::Text => Ok(Value::Text(raw.to_string())),
            ColumnType::Number => parse_number(trimmed).map(Value::Number).ok_or_else(coerce_err),
            ColumnType::Integer => trimmed.parse::<i64>().map(Value::Integer).map_err(|_| coerce_err()),
        }
    }

    /// Untyped input: kept as text, blank is `Empty`.
    pub fn from_input(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Value::Empty
        } else {
            Value::Text(raw.to_string())
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Null-like: `Empty`, NaN, or blank text.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Number(n) => n.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
            Value::Integer(_) => false,
        }
    }

    /// Numeric view; text is parsed leniently (thousands separators allowed).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Text(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Display form used in templates, keys and written output.
    pub fn render(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Ordering for sorts: numbers before text, empties last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.render().cmp(&other.render()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&ConfigValue> for Value {
    fn from(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Scalar(Scalar::String(s)) => Value::Text(s.clone()),
            ConfigValue::Scalar(Scalar::Integer(i)) => Value::Integer(*i),
            ConfigValue::Scalar(Scalar::Float(x)) => Value::Number(*x),
            ConfigValue::Scalar(Scalar::Bool(b)) => Value::Text(b.to_string()),
            ConfigValue::Sequence(_) | ConfigValue::Mapping(_) => Value::Empty,
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .or_else(|| s.replace(',', "").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Integers without decimals, everything else in shortest round-trip form.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        String::new()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typed() {
        assert_eq!(Value::parse("12.50", ColumnType::Number, "amt").unwrap(), Value::Number(12.5));
        assert_eq!(Value::parse("1,200.00", ColumnType::Number, "amt").unwrap(), Value::Number(1200.0));
        assert_eq!(Value::parse("7", ColumnType::Integer, "n").unwrap(), Value::Integer(7));
        assert_eq!(Value::parse("  ", ColumnType::Number, "amt").unwrap(), Value::Empty);
        assert_eq!(
            Value::parse("00123", ColumnType::Text, "rrn").unwrap(),
            Value::Text("00123".into())
        );
    }

    #[test]
    fn parse_rejects_non_numeric() {
        let err = Value::parse("abc", ColumnType::Number, "amt").unwrap_err();
        assert!(err.to_string().contains("amt"));
    }

    #[test]
    fn render_numbers() {
        assert_eq!(Value::Number(100.0).render(), "100");
        assert_eq!(Value::Number(-2.5).render(), "-2.5");
        assert_eq!(Value::Empty.render(), "");
    }

    #[test]
    fn sort_order_numbers_text_empty() {
        let mut v = vec![
            Value::Empty,
            Value::text("b"),
            Value::Number(5.0),
            Value::text("-10"),
        ];
        v.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            v,
            vec![Value::text("-10"), Value::Number(5.0), Value::text("b"), Value::Empty]
        );
    }
}
