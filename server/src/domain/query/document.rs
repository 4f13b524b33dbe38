//! Backend-native query document
//!
//! Serializes to the groupBy JSON shape the analytics backend accepts.

use serde::Serialize;

/// Output name of the time dimension
pub const TIME_DIMENSION: &str = "time";

/// Physical column holding event time in every datasource
pub const BACKEND_TIME_COLUMN: &str = "__time";

/// Timezone used for time bucket formatting
pub const TIME_FORMAT_ZONE: &str = "Europe/Paris";

/// Value-level transformation applied to a dimension or filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExtractionFn {
    TimeFormat {
        format: String,
        #[serde(rename = "timeZone")]
        time_zone: String,
    },
    Lookup {
        lookup: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DimensionSpec {
    /// Bare physical column name
    Plain(String),
    Typed(TypedDimension),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TypedDimension {
    /// Whole-range time bucket, no formatting
    Default {
        dimension: String,
        #[serde(rename = "outputName")]
        output_name: String,
    },
    Extraction {
        dimension: String,
        #[serde(rename = "outputName")]
        output_name: String,
        #[serde(rename = "extractionFn")]
        extraction_fn: ExtractionFn,
    },
    Lookup {
        dimension: String,
        #[serde(rename = "outputName")]
        output_name: String,
        name: String,
    },
}

/// Primitive aggregation computed by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Aggregation {
    DoubleSum {
        name: String,
        #[serde(rename = "fieldName")]
        field_name: String,
    },
}

impl Aggregation {
    pub fn double_sum(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::DoubleSum {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Aggregation::DoubleSum { name, .. } => name,
        }
    }
}

/// Expression evaluated over aggregation outputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostAggregation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: PostAggregationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PostAggregationKind {
    Constant {
        value: f64,
    },
    FieldAccess {
        #[serde(rename = "fieldName")]
        field_name: String,
    },
    Arithmetic {
        #[serde(rename = "fn")]
        function: String,
        fields: Vec<PostAggregation>,
    },
}

impl PostAggregation {
    pub fn constant(value: f64) -> Self {
        Self {
            name: None,
            kind: PostAggregationKind::Constant { value },
        }
    }

    pub fn field_access(field_name: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: PostAggregationKind::FieldAccess {
                field_name: field_name.into(),
            },
        }
    }

    pub fn arithmetic(function: &str, left: PostAggregation, right: PostAggregation) -> Self {
        Self {
            name: None,
            kind: PostAggregationKind::Arithmetic {
                function: function.to_string(),
                fields: vec![left, right],
            },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Filter tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DimFilter {
    In {
        dimension: String,
        values: Vec<String>,
        #[serde(rename = "extractionFn", skip_serializing_if = "Option::is_none")]
        extraction_fn: Option<ExtractionFn>,
    },
    And {
        fields: Vec<DimFilter>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub application: String,
}

/// Complete groupBy query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub query_type: &'static str,
    pub data_source: String,
    pub dimensions: Vec<DimensionSpec>,
    pub aggregations: Vec<Aggregation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_aggregations: Vec<PostAggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<DimFilter>,
    pub intervals: Vec<String>,
    pub granularity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<QueryContext>,
}
