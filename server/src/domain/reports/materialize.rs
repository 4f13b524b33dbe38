//! Result materialization into typed cells
//!
//! Rows are typed once here; every artifact renderer consumes the same
//! [`ResultTable`].

use std::collections::BTreeSet;

use serde_json::Value;

use super::spec::ReportSpec;
use crate::data::druid::Row;
use crate::domain::query::TIME_DIMENSION;
use crate::utils::time::{epoch_millis_to_hour, iso_to_hour};

/// One rendered result cell
#[derive(Debug, Clone, PartialEq)]
pub enum TypedCell {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
    /// Hour-truncated timestamp
    Time(String),
    Empty,
}

impl TypedCell {
    /// Textual form (integers without decimal point, floats in minimal
    /// non-exponent form, empty as "")
    pub fn render(&self) -> String {
        match self {
            TypedCell::Integer(v) => v.to_string(),
            TypedCell::Unsigned(v) => v.to_string(),
            TypedCell::Float(v) => v.to_string(),
            TypedCell::Text(s) | TypedCell::Time(s) => s.clone(),
            TypedCell::Empty => String::new(),
        }
    }

    fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => TypedCell::Empty,
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    TypedCell::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    TypedCell::Unsigned(u)
                } else {
                    n.as_f64().map_or(TypedCell::Empty, TypedCell::Float)
                }
            }
            Some(Value::String(s)) => TypedCell::Text(s.clone()),
            Some(other) => TypedCell::Text(other.to_string()),
        }
    }

    /// `time` columns: epoch millis (number or numeric string) and ISO
    /// timestamps become hour-truncated UTC; anything else passes through.
    fn time_from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => TypedCell::Empty,
            Some(Value::Number(n)) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
                millis
                    .and_then(epoch_millis_to_hour)
                    .map_or_else(|| TypedCell::Text(n.to_string()), TypedCell::Time)
            }
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(epoch_millis_to_hour)
                .or_else(|| iso_to_hour(s))
                .map_or_else(|| TypedCell::Text(s.clone()), TypedCell::Time),
            Some(other) => TypedCell::Text(other.to_string()),
        }
    }
}

/// Column header plus typed rows, columns in output order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<TypedCell>>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `time` (if requested), then the other dimensions sorted, then the
/// metrics sorted. Depends only on the report request, never on row content.
pub fn column_order(spec: &ReportSpec) -> Vec<String> {
    let has_time = spec.dimensions.iter().any(|d| d == TIME_DIMENSION);
    let dimensions: BTreeSet<&String> = spec
        .dimensions
        .iter()
        .filter(|d| *d != TIME_DIMENSION)
        .collect();
    let metrics: BTreeSet<&String> = spec.metrics.iter().collect();

    has_time
        .then(|| TIME_DIMENSION.to_string())
        .into_iter()
        .chain(dimensions.into_iter().cloned())
        .chain(metrics.into_iter().cloned())
        .collect()
}

/// Type every row against the report's column order
pub fn materialize(spec: &ReportSpec, rows: &[Row]) -> ResultTable {
    let columns = column_order(spec);
    let rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    if col == TIME_DIMENSION {
                        TypedCell::time_from_value(row.get(col))
                    } else {
                        TypedCell::from_value(row.get(col))
                    }
                })
                .collect()
        })
        .collect();

    ResultTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn test_column_order_time_first_then_sorted() {
        let spec = ReportSpec::new(&["country", "time", "browser"], &["revenue", "clicks"]);
        assert_eq!(
            column_order(&spec),
            vec!["time", "browser", "country", "clicks", "revenue"]
        );
    }

    #[test]
    fn test_column_order_without_time() {
        let spec = ReportSpec::new(&["os", "browser", "os"], &["revenue"]);
        assert_eq!(column_order(&spec), vec!["browser", "os", "revenue"]);
    }

    #[test]
    fn test_cells_typed_by_value() {
        let spec = ReportSpec::new(&["browser"], &["clicks", "cpm", "big", "missing"]);
        let table = materialize(
            &spec,
            &[row(json!({
                "browser": "firefox",
                "clicks": 12,
                "cpm": 1.25,
                "big": 18446744073709551615u64,
                "missing": null
            }))],
        );
        assert_eq!(table.columns, vec!["browser", "big", "clicks", "cpm", "missing"]);
        assert_eq!(
            table.rows[0],
            vec![
                TypedCell::Text("firefox".into()),
                TypedCell::Unsigned(u64::MAX),
                TypedCell::Integer(12),
                TypedCell::Float(1.25),
                TypedCell::Empty,
            ]
        );
    }

    #[test]
    fn test_float_render_has_no_exponent() {
        assert_eq!(TypedCell::Float(1e21).render(), "1000000000000000000000");
        assert_eq!(TypedCell::Float(0.0000001).render(), "0.0000001");
        assert_eq!(TypedCell::Float(2.5).render(), "2.5");
        assert_eq!(TypedCell::Integer(-3).render(), "-3");
        assert_eq!(TypedCell::Empty.render(), "");
    }

    #[test]
    fn test_time_cells() {
        let spec = ReportSpec::new(&["time"], &[]);
        let table = materialize(
            &spec,
            &[
                row(json!({ "time": 1_705_314_645_123i64 })),
                row(json!({ "time": "1705314645123" })),
                row(json!({ "time": "2024-01-15T10:30:00.000Z" })),
                row(json!({ "time": "2024-01" })),
                row(json!({})),
            ],
        );
        let cells: Vec<&TypedCell> = table.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(
            cells,
            vec![
                &TypedCell::Time("2024-01-15 10".into()),
                &TypedCell::Time("2024-01-15 10".into()),
                &TypedCell::Time("2024-01-15 10".into()),
                &TypedCell::Text("2024-01".into()),
                &TypedCell::Empty,
            ]
        );
    }

    #[test]
    fn test_zero_rows_keep_header() {
        let spec = ReportSpec::new(&["time", "browser"], &["revenue"]);
        let table = materialize(&spec, &[]);
        assert!(table.is_empty());
        assert_eq!(table.columns, vec!["time", "browser", "revenue"]);
    }
}
