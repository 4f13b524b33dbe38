//! Metric formula engine
//!
//! Parses arithmetic metric definitions (`1000 * revenue / impressions`,
//! `sum(clicks) / sum(views)`) and compiles them into primitive backend
//! aggregations plus one post-aggregation expression.

mod compile;
mod error;
mod parser;

pub use compile::{CompiledFormula, SUM_FUNCTION, compile, sum_aggregation_name};
pub use error::FormulaError;
pub use parser::{BinaryOp, FormulaNode, collect_leaf_fields, parse};
