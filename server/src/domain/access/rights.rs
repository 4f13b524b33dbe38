//! Submission-time rights check
//!
//! Runs before any job exists. Problems are reported as stable string codes
//! (`dimension:<name>:unknown`, `metric:<name>:forbidden`, ...) so callers
//! can fix the whole request in one round trip.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::domain::query::TIME_DIMENSION;
use crate::domain::reports::ReportSpec;
use crate::domain::schema::SchemaCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dimension,
    Metric,
}

impl FieldKind {
    fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Dimension => "dimension",
            FieldKind::Metric => "metric",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RightsProblem {
    DatasourceNotFound,
    Unknown { kind: FieldKind, name: String },
    Forbidden { kind: FieldKind, name: String },
}

impl fmt::Display for RightsProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RightsProblem::DatasourceNotFound => f.write_str("datasource_not_found"),
            RightsProblem::Unknown { kind, name } => {
                write!(f, "{}:{}:unknown", kind.as_str(), name)
            }
            RightsProblem::Forbidden { kind, name } => {
                write!(f, "{}:{}:forbidden", kind.as_str(), name)
            }
        }
    }
}

impl Serialize for RightsProblem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Check requested dimensions and metrics against the datasource schema.
/// `time` is always allowed.
pub fn check_rights(
    spec: &ReportSpec,
    catalog: &SchemaCatalog,
    datasource: &str,
    is_admin: bool,
) -> Vec<RightsProblem> {
    let Some(schema) = catalog.get_datasource(datasource) else {
        return vec![RightsProblem::DatasourceNotFound];
    };

    let mut problems = Vec::new();

    for dim in &spec.dimensions {
        if dim == TIME_DIMENSION {
            continue;
        }
        match schema.dimensions.get(dim) {
            None => problems.push(RightsProblem::Unknown {
                kind: FieldKind::Dimension,
                name: dim.clone(),
            }),
            Some(field) if field.reserved && !is_admin => {
                problems.push(RightsProblem::Forbidden {
                    kind: FieldKind::Dimension,
                    name: dim.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for metric in &spec.metrics {
        match schema.metrics.get(metric) {
            None => problems.push(RightsProblem::Unknown {
                kind: FieldKind::Metric,
                name: metric.clone(),
            }),
            Some(field) if field.reserved && !is_admin => {
                problems.push(RightsProblem::Forbidden {
                    kind: FieldKind::Metric,
                    name: metric.clone(),
                })
            }
            Some(_) => {}
        }
    }

    problems
}
