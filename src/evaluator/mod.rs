pub mod condition;
pub mod handlers;
pub mod type_coercion;

pub use condition::{evaluate_case, evaluate_cases, evaluate_condition, evaluate_conditions};
pub use handlers::{check_run_condition, handler_for, ConditionHandler, EdgeContext};
