//! Query compilation: report spec plus schema to backend query document

mod compiler;
mod document;
mod intervals;

pub use compiler::{CompileError, QueryCompiler, build_aggregations, build_filter, compile_query};
pub use document::{
    Aggregation, BACKEND_TIME_COLUMN, CompiledQuery, DimFilter, DimensionSpec, ExtractionFn,
    PostAggregation, PostAggregationKind, QueryContext, TIME_DIMENSION, TIME_FORMAT_ZONE,
    TypedDimension,
};
pub use intervals::{ALL_TIME_INTERVAL, Interval, compute_intervals, interval_strings};
