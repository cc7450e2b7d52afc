//! Backend-neutral result values and their text rendering.
//!
//! Driver-native rows are converted into [`Row`] at the connector boundary so
//! every tool renders results the same way regardless of which backend
//! produced them.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::Deserialize;

/// A single result record keyed by column or field name.
pub type Row = BTreeMap<String, Value>;

/// Scalar or nested value produced by a backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal kept as its canonical text, rendered unquoted.
    #[serde(skip_deserializing)]
    Number(String),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => number.as_i64().map_or_else(
                || number.as_f64().map_or(Self::Null, Self::Float),
                Self::Int,
            ),
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(fields) => Self::Map(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(number) => write!(f, "{number}"),
            Self::Float(number) => write_float(f, *number),
            Self::Number(digits) => f.write_str(digits),
            Self::Text(text) => write!(f, "{}", serde_json::Value::String(text.clone())),
            Self::List(items) => {
                f.write_char('[')?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Self::Map(fields) => {
                f.write_char('{')?;
                for (index, (key, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, number: f64) -> fmt::Result {
    if number.is_nan() {
        f.write_str("NaN")
    } else if number.is_infinite() {
        f.write_str(if number.is_sign_positive() { "inf" } else { "-inf" })
    } else if number.fract().abs() < f64::EPSILON && number.abs() < 1e16 {
        write!(f, "{number:.1}")
    } else {
        write!(f, "{number}")
    }
}

/// Renders a row with its fields in key order.
#[must_use]
pub fn render_row(row: &Row) -> String {
    let mut out = String::from("{");
    for (index, (key, value)) in row.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{key}: {value}");
    }
    out.push('}');
    out
}

/// Renders a row following the given column order.
///
/// Columns missing from the row render as `null`.
#[must_use]
pub fn render_row_with(row: &Row, columns: &[String]) -> String {
    let mut out = String::from("{");
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let value = row.get(column).unwrap_or(&Value::Null);
        let _ = write!(out, "{column}: {value}");
    }
    out.push('}');
    out
}

/// Renders rows one per line.
#[must_use]
pub fn render_rows(rows: &[Row]) -> String {
    rows.iter().map(render_row).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let mut nested = BTreeMap::new();
        nested.insert("since".to_string(), Value::Int(2019));
        let mut row = Row::new();
        row.insert("name".to_string(), Value::text("Ada \"Countess\""));
        row.insert("score".to_string(), Value::Float(3.0));
        row.insert(
            "tags".to_string(),
            Value::List(vec![Value::text("a"), Value::Null, Value::Bool(true)]),
        );
        row.insert("meta".to_string(), Value::Map(nested));
        row
    }

    #[test]
    fn renders_row_in_key_order() {
        let rendered = render_row(&sample_row());
        assert_eq!(
            rendered,
            r#"{meta: {since: 2019}, name: "Ada \"Countess\"", score: 3.0, tags: ["a", null, true]}"#
        );
    }

    #[test]
    fn renders_row_in_column_order_with_missing_columns() {
        let columns = vec!["score".to_string(), "missing".to_string(), "name".to_string()];
        let rendered = render_row_with(&sample_row(), &columns);
        assert_eq!(rendered, r#"{score: 3.0, missing: null, name: "Ada \"Countess\""}"#);
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Float(-2.0).to_string(), "-2.0");
        assert_eq!(Value::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn converts_json_documents() {
        let json = serde_json::json!({"id": 7, "distance": 0.5, "label": "cat", "extra": [1, null]});
        let Value::Map(fields) = Value::from(json) else {
            panic!("expected a map");
        };
        assert_eq!(fields.get("id"), Some(&Value::Int(7)));
        assert_eq!(fields.get("distance"), Some(&Value::Float(0.5)));
        assert_eq!(fields.get("label"), Some(&Value::text("cat")));
        assert_eq!(
            fields.get("extra"),
            Some(&Value::List(vec![Value::Int(1), Value::Null]))
        );
    }

    #[test]
    fn rendering_is_stable_across_calls() {
        let rows = vec![sample_row(), Row::new()];
        assert_eq!(render_rows(&rows), render_rows(&rows.clone()));
        assert!(render_rows(&rows).ends_with("\n{}"));
    }

    #[test]
    fn exact_numbers_render_unquoted() {
        let mut row = Row::new();
        row.insert("total".to_string(), Value::Number("1234.50".to_string()));
        row.insert("ids".to_string(), Value::List(vec![Value::Int(1), Value::Null]));
        assert_eq!(render_row(&row), "{ids: [1, null], total: 1234.50}");
    }
}
