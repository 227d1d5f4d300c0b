use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Selector;

/// Comparison operators used by condition evaluation.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Contains,
    #[serde(alias = "not contains")]
    NotContains,
    #[serde(alias = "start with", alias = "starts_with")]
    StartWith,
    #[serde(alias = "end with", alias = "ends_with")]
    EndWith,
    Is,
    #[serde(alias = "is not")]
    IsNot,
    Empty,
    #[serde(alias = "not empty")]
    NotEmpty,
    In,
    #[serde(alias = "not in")]
    NotIn,
    #[serde(alias = "all of")]
    AllOf,
    #[serde(alias = "=")]
    Equal,
    #[serde(alias = "≠", alias = "!=")]
    NotEqual,
    #[serde(alias = ">")]
    GreaterThan,
    #[serde(alias = "<")]
    LessThan,
    #[serde(alias = "≥", alias = ">=", alias = "greater_than_or_equal")]
    GreaterOrEqual,
    #[serde(alias = "≤", alias = "<=", alias = "less_than_or_equal")]
    LessOrEqual,
    Before,
    After,
    Null,
    #[serde(alias = "not null")]
    NotNull,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// One comparison against a pool variable.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub variable_selector: Selector,
    pub comparison_operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

/// A named group of conditions, as used by if/else nodes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Case {
    pub case_id: String,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_aliases() {
        let ops: Vec<ComparisonOperator> =
            serde_json::from_value(serde_json::json!(["not contains", "≥", "start with", "after"]))
                .unwrap();
        assert_eq!(
            ops,
            vec![
                ComparisonOperator::NotContains,
                ComparisonOperator::GreaterOrEqual,
                ComparisonOperator::StartWith,
                ComparisonOperator::After,
            ]
        );
    }

    #[test]
    fn test_case_defaults_to_and() {
        let case: Case = serde_json::from_value(serde_json::json!({
            "case_id": "adult",
            "conditions": [
                {"variable_selector": ["start", "age"], "comparison_operator": ">", "value": 18}
            ]
        }))
        .unwrap();
        assert_eq!(case.logical_operator, LogicalOperator::And);
        assert_eq!(case.conditions[0].variable_selector.variable(), "age");
    }
}
