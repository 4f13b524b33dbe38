//! Formula compilation into backend aggregations
//!
//! Every field referenced by a formula is summed once into an aggregation
//! named `sum_<field>`; the formula itself becomes a post-aggregation tree
//! reading those sums.

use std::collections::{BTreeMap, HashSet};

use super::error::FormulaError;
use super::parser::{FormulaNode, collect_leaf_fields};
use crate::domain::query::{Aggregation, PostAggregation};
use crate::domain::schema::Field;

/// Only aggregation function understood by the backend mapping
pub const SUM_FUNCTION: &str = "sum";

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    pub aggregations: Vec<Aggregation>,
    pub post_aggregation: PostAggregation,
}

/// Aggregation name for a summed formula leaf
pub fn sum_aggregation_name(field: &str) -> String {
    format!("{}_{}", SUM_FUNCTION, field)
}

/// Compile a parsed formula for `metric`, resolving leaves against `metrics`
pub fn compile(
    metric: &str,
    node: &FormulaNode,
    metrics: &BTreeMap<String, Field>,
) -> Result<CompiledFormula, FormulaError> {
    let mut aggregations = Vec::new();
    let mut seen = HashSet::new();

    for leaf in collect_leaf_fields(node) {
        let physical = metrics
            .get(&leaf)
            .map(|f| f.druid.as_str())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| FormulaError::UnknownField {
                metric: metric.to_string(),
                field: leaf.clone(),
            })?;

        let name = sum_aggregation_name(&leaf);
        if seen.insert(name.clone()) {
            aggregations.push(Aggregation::double_sum(name, physical));
        }
    }

    let post_aggregation = to_post_aggregation(metric, node)?.named(metric);
    Ok(CompiledFormula {
        aggregations,
        post_aggregation,
    })
}

fn to_post_aggregation(metric: &str, node: &FormulaNode) -> Result<PostAggregation, FormulaError> {
    Ok(match node {
        FormulaNode::Number(value) => PostAggregation::constant(*value),
        FormulaNode::Field(field) => PostAggregation::field_access(sum_aggregation_name(field)),
        FormulaNode::Call { function, field } => {
            if function != SUM_FUNCTION {
                return Err(FormulaError::UnsupportedFunction {
                    metric: metric.to_string(),
                    function: function.clone(),
                });
            }
            PostAggregation::field_access(sum_aggregation_name(field))
        }
        FormulaNode::Binary { op, left, right } => PostAggregation::arithmetic(
            op.symbol(),
            to_post_aggregation(metric, left)?,
            to_post_aggregation(metric, right)?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::formula::parse;
    use crate::domain::query::PostAggregationKind;

    fn metrics() -> BTreeMap<String, Field> {
        let mut m = BTreeMap::new();
        m.insert("revenue".to_string(), Field::physical("rev_eur"));
        m.insert("impressions".to_string(), Field::physical("imps"));
        m.insert("clicks".to_string(), Field::physical("clicks"));
        m.insert(
            "cpm".to_string(),
            Field::with_formula("1000 * revenue / impressions"),
        );
        m
    }

    #[test]
    fn test_compile_cpm() {
        let node = parse("1000 * revenue / impressions").unwrap();
        let compiled = compile("cpm", &node, &metrics()).unwrap();

        assert_eq!(
            compiled.aggregations,
            vec![
                Aggregation::double_sum("sum_revenue", "rev_eur"),
                Aggregation::double_sum("sum_impressions", "imps"),
            ]
        );
        assert_eq!(compiled.post_aggregation.name.as_deref(), Some("cpm"));
        let PostAggregationKind::Arithmetic { function, fields } = &compiled.post_aggregation.kind
        else {
            panic!("expected arithmetic root");
        };
        assert_eq!(function, "/");
        assert_eq!(fields[1], PostAggregation::field_access("sum_impressions"));
    }

    #[test]
    fn test_duplicate_leaves_collapse() {
        let node = parse("(clicks + clicks) / sum(clicks)").unwrap();
        let compiled = compile("double_ctr", &node, &metrics()).unwrap();
        assert_eq!(
            compiled.aggregations,
            vec![Aggregation::double_sum("sum_clicks", "clicks")]
        );
    }

    #[test]
    fn test_sum_call_is_plain_field_access() {
        let node = parse("sum(revenue)").unwrap();
        let compiled = compile("total", &node, &metrics()).unwrap();
        assert_eq!(
            compiled.post_aggregation,
            PostAggregation::field_access("sum_revenue").named("total")
        );
    }

    #[test]
    fn test_unknown_leaf_is_error() {
        let node = parse("revenue / visits").unwrap();
        assert_eq!(
            compile("rpv", &node, &metrics()),
            Err(FormulaError::UnknownField {
                metric: "rpv".into(),
                field: "visits".into()
            })
        );
    }

    #[test]
    fn test_formula_leaf_without_physical_name_is_error() {
        let node = parse("cpm * 2").unwrap();
        assert!(matches!(
            compile("double_cpm", &node, &metrics()),
            Err(FormulaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_unsupported_function() {
        let node = parse("avg(revenue)").unwrap();
        assert_eq!(
            compile("avg_rev", &node, &metrics()),
            Err(FormulaError::UnsupportedFunction {
                metric: "avg_rev".into(),
                function: "avg".into()
            })
        );
    }
}
