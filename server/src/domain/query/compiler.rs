//! Report spec to backend query compilation
//!
//! [`compile_query`] is pure: same spec, schema and access filters always
//! produce the same document. [`QueryCompiler`] adds access-filter
//! resolution in front of it.

use std::collections::HashSet;

use thiserror::Error;

use super::document::{
    Aggregation, BACKEND_TIME_COLUMN, CompiledQuery, DimFilter, DimensionSpec, ExtractionFn,
    PostAggregation, QueryContext, TIME_DIMENSION, TIME_FORMAT_ZONE, TypedDimension,
};
use super::intervals::interval_strings;
use crate::data::grants::GrantError;
use crate::domain::access::{AccessFilterResolver, AccessFilters};
use crate::domain::formula::{self, FormulaError};
use crate::domain::reports::{Granularity, ReportSpec};
use crate::domain::schema::DatasourceSchema;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("formula for {metric}: {source}")]
    Formula {
        metric: String,
        #[source]
        source: FormulaError,
    },

    #[error("access filters unavailable: {0}")]
    Access(#[from] GrantError),
}

fn time_dimension(granularity: Granularity) -> DimensionSpec {
    let format = match granularity {
        Granularity::Hour => "yyyy-MM-dd HH",
        Granularity::Day => "yyyy-MM-dd",
        Granularity::Week => "YYYY-'W'ww",
        Granularity::Month => "yyyy-MM",
        Granularity::All => {
            return DimensionSpec::Typed(TypedDimension::Default {
                dimension: BACKEND_TIME_COLUMN.to_string(),
                output_name: TIME_DIMENSION.to_string(),
            });
        }
    };
    DimensionSpec::Typed(TypedDimension::Extraction {
        dimension: BACKEND_TIME_COLUMN.to_string(),
        output_name: TIME_DIMENSION.to_string(),
        extraction_fn: ExtractionFn::TimeFormat {
            format: format.to_string(),
            time_zone: TIME_FORMAT_ZONE.to_string(),
        },
    })
}

fn build_dimensions(
    dims: &[String],
    schema: &DatasourceSchema,
    granularity: Granularity,
) -> Result<Vec<DimensionSpec>, CompileError> {
    dims.iter()
        .map(|d| {
            if d == TIME_DIMENSION {
                return Ok(time_dimension(granularity));
            }
            let field = schema
                .dimensions
                .get(d)
                .ok_or_else(|| CompileError::UnknownDimension(d.clone()))?;
            Ok(match field.lookup() {
                Some(lookup) => DimensionSpec::Typed(TypedDimension::Lookup {
                    dimension: field.druid.clone(),
                    output_name: d.clone(),
                    name: lookup.to_string(),
                }),
                None if field.druid == *d => DimensionSpec::Plain(field.druid.clone()),
                // Renamed columns keep the logical name in result rows
                None => DimensionSpec::Typed(TypedDimension::Default {
                    dimension: field.druid.clone(),
                    output_name: d.clone(),
                }),
            })
        })
        .collect()
}

/// Primitive aggregations (deduplicated by name) and formula post-aggregations
pub fn build_aggregations(
    metrics: &[String],
    schema: &DatasourceSchema,
) -> Result<(Vec<Aggregation>, Vec<PostAggregation>), CompileError> {
    let mut aggregations = Vec::new();
    let mut post_aggregations = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |agg: Aggregation, aggregations: &mut Vec<Aggregation>| {
        if seen.insert(agg.name().to_string()) {
            aggregations.push(agg);
        }
    };

    for metric in metrics {
        let field = schema
            .metrics
            .get(metric)
            .ok_or_else(|| CompileError::UnknownMetric(metric.clone()))?;

        match field.formula() {
            Some(text) => {
                let wrap = |source| CompileError::Formula {
                    metric: metric.clone(),
                    source,
                };
                let node = formula::parse(text).map_err(wrap)?;
                let compiled = formula::compile(metric, &node, &schema.metrics).map_err(wrap)?;
                for agg in compiled.aggregations {
                    push(agg, &mut aggregations);
                }
                post_aggregations.push(compiled.post_aggregation);
            }
            None => push(
                Aggregation::double_sum(metric.clone(), field.druid.clone()),
                &mut aggregations,
            ),
        }
    }

    Ok((aggregations, post_aggregations))
}

fn in_filter(
    dimension: &str,
    values: &[String],
    schema: &DatasourceSchema,
) -> Result<DimFilter, CompileError> {
    let field = schema
        .dimensions
        .get(dimension)
        .ok_or_else(|| CompileError::UnknownDimension(dimension.to_string()))?;
    Ok(DimFilter::In {
        dimension: field.druid.clone(),
        values: values.to_vec(),
        extraction_fn: field.lookup().map(|l| ExtractionFn::Lookup {
            lookup: l.to_string(),
        }),
    })
}

/// Caller filters first, then access filters; each becomes its own `in`
/// clause. Same-dimension constraints are conjoined, not intersected.
pub fn build_filter(
    spec: &ReportSpec,
    access: Option<&AccessFilters>,
    schema: &DatasourceSchema,
) -> Result<Option<DimFilter>, CompileError> {
    let mut clauses = Vec::new();
    for f in &spec.filters {
        clauses.push(in_filter(&f.dimension, &f.values, schema)?);
    }
    for (dimension, values) in access.into_iter().flatten() {
        if values.is_empty() {
            continue;
        }
        clauses.push(in_filter(dimension, values, schema)?);
    }

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(DimFilter::And { fields: clauses }),
    })
}

/// Compile one report into a backend query document
pub fn compile_query(
    schema: &DatasourceSchema,
    spec: &ReportSpec,
    access: Option<&AccessFilters>,
    context: Option<&str>,
) -> Result<CompiledQuery, CompileError> {
    let dimensions = build_dimensions(&spec.dimensions, schema, spec.granularity)?;
    let (aggregations, post_aggregations) = build_aggregations(&spec.metrics, schema)?;
    let filter = build_filter(spec, access, schema)?;

    Ok(CompiledQuery {
        query_type: "groupBy",
        data_source: schema.backend_name.clone(),
        dimensions,
        aggregations,
        post_aggregations,
        filter,
        intervals: interval_strings(spec.dates, spec.compare),
        granularity: spec.granularity.to_string(),
        context: context.map(|c| QueryContext {
            application: c.to_string(),
        }),
    })
}

/// Access-aware compiler used by the execution pipeline
#[derive(Clone)]
pub struct QueryCompiler {
    resolver: AccessFilterResolver,
}

impl QueryCompiler {
    pub fn new(resolver: AccessFilterResolver) -> Self {
        Self { resolver }
    }

    /// `context` is the application tag the backend sees for this query
    pub async fn compile(
        &self,
        datasource: &str,
        schema: &DatasourceSchema,
        spec: &ReportSpec,
        username: &str,
        is_admin: bool,
        context: &str,
    ) -> Result<CompiledQuery, CompileError> {
        let access = self
            .resolver
            .resolve(username, is_admin, datasource, schema)
            .await?;
        compile_query(schema, spec, access.as_ref(), Some(context))
    }
}
