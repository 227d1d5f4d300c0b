use serde_json::Value;

use crate::core::variable_pool::VariablePool;
use crate::domain::model::{Case, ComparisonOperator, Condition, LogicalOperator};
use crate::domain::Segment;
use crate::error::NodeError;

use super::type_coercion::{
    expected_f64, expected_string_list, expected_timestamp, segment_timestamp, value_to_string,
};

/// Evaluate IfElse cases, returning the case_id of the first matching case,
/// or "false" if no case matches (else branch).
pub fn evaluate_cases(cases: &[Case], pool: &VariablePool) -> Result<String, NodeError> {
    for case in cases {
        if evaluate_case(case, pool)? {
            return Ok(case.case_id.clone());
        }
    }
    Ok("false".to_string())
}

/// Evaluate a single case (AND/OR logic)
pub fn evaluate_case(case: &Case, pool: &VariablePool) -> Result<bool, NodeError> {
    evaluate_conditions(case.logical_operator, &case.conditions, pool)
}

/// Combine conditions with short-circuiting: `and` stops at the first false,
/// `or` at the first true. An empty list is a malformed tree.
pub fn evaluate_conditions(
    logical_operator: LogicalOperator,
    conditions: &[Condition],
    pool: &VariablePool,
) -> Result<bool, NodeError> {
    if conditions.is_empty() {
        return Err(NodeError::ConfigError(
            "condition list must not be empty".to_string(),
        ));
    }
    match logical_operator {
        LogicalOperator::And => {
            for cond in conditions {
                if !evaluate_condition(cond, pool)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        LogicalOperator::Or => {
            for cond in conditions {
                if evaluate_condition(cond, pool)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Evaluate a single condition.
///
/// A missing or ill-typed variable makes the comparison false. An operand that
/// cannot be interpreted for the operator is a configuration error.
pub fn evaluate_condition(cond: &Condition, pool: &VariablePool) -> Result<bool, NodeError> {
    let actual = pool.get(&cond.variable_selector);
    let expected = &cond.value;

    let result = match cond.comparison_operator {
        // --- String/Array ---
        ComparisonOperator::Contains => eval_contains(&actual, expected),
        ComparisonOperator::NotContains => !eval_contains(&actual, expected),
        ComparisonOperator::StartWith => match &actual {
            Segment::String(s) => s.starts_with(&value_to_string(expected)),
            Segment::Array(items) => items
                .first()
                .map_or(false, |f| f.to_display_string() == value_to_string(expected)),
            _ => false,
        },
        ComparisonOperator::EndWith => match &actual {
            Segment::String(s) => s.ends_with(&value_to_string(expected)),
            Segment::Array(items) => items
                .last()
                .map_or(false, |l| l.to_display_string() == value_to_string(expected)),
            _ => false,
        },

        // --- Exact equality ---
        ComparisonOperator::Is => eval_is(&actual, expected),
        ComparisonOperator::IsNot => !eval_is(&actual, expected),

        // --- Emptiness ---
        ComparisonOperator::Empty => actual.is_empty(),
        ComparisonOperator::NotEmpty => !actual.is_empty(),

        // --- Membership ---
        ComparisonOperator::In => {
            let list = expected_string_list(expected)?;
            !actual.is_none() && list.contains(&actual.to_display_string())
        }
        ComparisonOperator::NotIn => {
            let list = expected_string_list(expected)?;
            !list.contains(&actual.to_display_string())
        }
        ComparisonOperator::AllOf => {
            let list = expected_string_list(expected)?;
            match &actual {
                Segment::Array(items) => {
                    let have: Vec<String> = items.iter().map(|s| s.to_display_string()).collect();
                    list.iter().all(|e| have.contains(e))
                }
                _ => false,
            }
        }

        // --- Numeric ---
        ComparisonOperator::Equal => compare_numeric(&actual, expected, |a, b| {
            (a - b).abs() < f64::EPSILON
        })?,
        ComparisonOperator::NotEqual => {
            let b = expected_f64(expected)?;
            actual.as_f64().map_or(true, |a| (a - b).abs() >= f64::EPSILON)
        }
        ComparisonOperator::GreaterThan => compare_numeric(&actual, expected, |a, b| a > b)?,
        ComparisonOperator::LessThan => compare_numeric(&actual, expected, |a, b| a < b)?,
        ComparisonOperator::GreaterOrEqual => compare_numeric(&actual, expected, |a, b| a >= b)?,
        ComparisonOperator::LessOrEqual => compare_numeric(&actual, expected, |a, b| a <= b)?,

        // --- Timestamp ---
        ComparisonOperator::Before => {
            let bound = expected_timestamp(expected)?;
            segment_timestamp(&actual).map_or(false, |t| t < bound)
        }
        ComparisonOperator::After => {
            let bound = expected_timestamp(expected)?;
            segment_timestamp(&actual).map_or(false, |t| t > bound)
        }

        // --- Null ---
        ComparisonOperator::Null => actual.is_none(),
        ComparisonOperator::NotNull => !actual.is_none(),
    };
    Ok(result)
}

// ================================
// Helper functions
// ================================

fn compare_numeric<F>(actual: &Segment, expected: &Value, cmp: F) -> Result<bool, NodeError>
where
    F: Fn(f64, f64) -> bool,
{
    let b = expected_f64(expected)?;
    Ok(actual.as_f64().map_or(false, |a| cmp(a, b)))
}

fn eval_is(actual: &Segment, expected: &Value) -> bool {
    match (actual, expected) {
        (Segment::Boolean(a), Value::Bool(b)) => a == b,
        (Segment::None, Value::Null) => true,
        (Segment::None, _) => false,
        _ => actual.to_display_string() == value_to_string(expected),
    }
}

fn eval_contains(actual: &Segment, expected: &Value) -> bool {
    let e = value_to_string(expected);
    match actual {
        Segment::String(s) => s.contains(&e),
        Segment::Array(arr) => arr.iter().any(|s| s.to_display_string() == e),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Selector;
    use serde_json::json;

    fn make_pool(vars: Vec<(&str, &str, Segment)>) -> VariablePool {
        let mut pool = VariablePool::new();
        for (node_id, var, val) in vars {
            pool.set(&Selector::new(node_id, var), val);
        }
        pool
    }

    fn make_condition(op: ComparisonOperator, val: Value) -> Condition {
        Condition {
            variable_selector: Selector::new("n", "x"),
            comparison_operator: op,
            value: val,
        }
    }

    fn check(x: Segment, op: ComparisonOperator, val: Value) -> bool {
        let pool = make_pool(vec![("n", "x", x)]);
        evaluate_condition(&make_condition(op, val), &pool).unwrap()
    }

    #[test]
    fn test_string_operators() {
        let s = || Segment::String("hello world".into());
        assert!(check(s(), ComparisonOperator::Contains, json!("world")));
        assert!(check(s(), ComparisonOperator::NotContains, json!("xyz")));
        assert!(check(s(), ComparisonOperator::StartWith, json!("hello")));
        assert!(check(s(), ComparisonOperator::EndWith, json!("world")));
        assert!(check(s(), ComparisonOperator::Is, json!("hello world")));
        assert!(check(s(), ComparisonOperator::IsNot, json!("hello")));
        assert!(check(Segment::String("".into()), ComparisonOperator::Empty, Value::Null));
        assert!(check(s(), ComparisonOperator::NotEmpty, Value::Null));
    }

    #[test]
    fn test_array_operators() {
        let arr = || Segment::from_value(&json!(["a", "b", "c"]));
        assert!(check(arr(), ComparisonOperator::Contains, json!("b")));
        assert!(check(arr(), ComparisonOperator::NotContains, json!("z")));
        assert!(check(arr(), ComparisonOperator::StartWith, json!("a")));
        assert!(check(arr(), ComparisonOperator::EndWith, json!("c")));
        assert!(check(arr(), ComparisonOperator::AllOf, json!(["a", "c"])));
        assert!(!check(arr(), ComparisonOperator::AllOf, json!(["a", "z"])));
        assert!(check(Segment::Array(vec![]), ComparisonOperator::Empty, Value::Null));
    }

    #[test]
    fn test_numeric_operators() {
        assert!(check(Segment::Integer(10), ComparisonOperator::GreaterThan, json!(5)));
        assert!(check(Segment::Integer(3), ComparisonOperator::LessThan, json!(5)));
        assert!(check(Segment::Float(3.14), ComparisonOperator::Equal, json!(3.14)));
        assert!(check(Segment::Integer(3), ComparisonOperator::NotEqual, json!(4)));
        assert!(check(Segment::Integer(5), ComparisonOperator::GreaterOrEqual, json!(5)));
        assert!(check(Segment::Integer(5), ComparisonOperator::LessOrEqual, json!("5")));
        // string variable coerces
        assert!(check(Segment::String("42".into()), ComparisonOperator::GreaterThan, json!("10")));
        // non-numeric variable never satisfies an ordering
        assert!(!check(Segment::String("abc".into()), ComparisonOperator::GreaterThan, json!(1)));
    }

    #[test]
    fn test_timestamp_operators() {
        let t = || Segment::String("2024-06-01T00:00:00Z".into());
        assert!(check(t(), ComparisonOperator::Before, json!("2024-12-31")));
        assert!(check(t(), ComparisonOperator::After, json!("2024-01-01 00:00:00")));
        assert!(!check(t(), ComparisonOperator::After, json!("2025-01-01")));
        assert!(check(Segment::Integer(10), ComparisonOperator::Before, json!(20)));
        assert!(!check(Segment::String("soon".into()), ComparisonOperator::Before, json!(20)));
    }

    #[test]
    fn test_membership_and_null() {
        assert!(check(Segment::String("b".into()), ComparisonOperator::In, json!(["a", "b"])));
        assert!(check(Segment::String("d".into()), ComparisonOperator::NotIn, json!(["a"])));
        let pool = make_pool(vec![]);
        let cond = make_condition(ComparisonOperator::Null, Value::Null);
        assert!(evaluate_condition(&cond, &pool).unwrap());
        assert!(check(Segment::Integer(1), ComparisonOperator::NotNull, Value::Null));
    }

    #[test]
    fn test_malformed_operand_is_config_error() {
        let pool = make_pool(vec![("n", "x", Segment::Integer(1))]);
        for (op, val) in [
            (ComparisonOperator::GreaterThan, json!("many")),
            (ComparisonOperator::Before, json!("someday")),
            (ComparisonOperator::In, json!({"a": 1})),
        ] {
            let err = evaluate_condition(&make_condition(op, val), &pool).unwrap_err();
            assert!(matches!(err, NodeError::ConfigError(_)), "{:?}", op);
        }
    }

    #[test]
    fn test_and_or_short_circuit() {
        let pool = make_pool(vec![("n", "x", Segment::Integer(10))]);
        // the second condition is malformed; short-circuit must never reach it
        let conds = vec![
            make_condition(ComparisonOperator::GreaterThan, json!(50)),
            make_condition(ComparisonOperator::LessThan, json!("bad")),
        ];
        assert!(!evaluate_conditions(LogicalOperator::And, &conds, &pool).unwrap());

        let conds = vec![
            make_condition(ComparisonOperator::GreaterThan, json!(5)),
            make_condition(ComparisonOperator::LessThan, json!("bad")),
        ];
        assert!(evaluate_conditions(LogicalOperator::Or, &conds, &pool).unwrap());
        assert!(evaluate_conditions(LogicalOperator::And, &[], &pool).is_err());
    }

    #[test]
    fn test_evaluate_cases_falls_back_to_false() {
        let pool = make_pool(vec![("n", "x", Segment::Integer(3))]);
        let cases = vec![Case {
            case_id: "big".into(),
            logical_operator: LogicalOperator::And,
            conditions: vec![make_condition(ComparisonOperator::GreaterThan, json!(100))],
        }];
        assert_eq!(evaluate_cases(&cases, &pool).unwrap(), "false");
    }
}
