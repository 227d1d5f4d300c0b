use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use graphflow::core::VariablePool;
use graphflow::domain::{ComparisonOperator, Condition, LogicalOperator, Segment, Selector};
use graphflow::evaluator::{evaluate_condition, evaluate_conditions};
use graphflow::{build_graph_from_dsl, DslFormat, GraphEngine, NodeRegistry};

const BRANCHING_YAML: &str = r#"
version: "0.1.0"
nodes:
  - { id: start, data: { type: start } }
  - id: route
    data:
      type: if-else
      cases:
        - case_id: big
          conditions:
            - { variable_selector: ["sys", "x"], comparison_operator: ">", value: 10 }
  - { id: big_answer, data: { type: answer, answer: "big" } }
  - { id: small_answer, data: { type: answer, answer: "small" } }
edges:
  - { source: start, target: route }
  - { source: route, target: big_answer, source_handle: big }
  - { source: route, target: small_answer, source_handle: "false" }
"#;

fn make_pool_with_value(value: Segment) -> VariablePool {
    let mut pool = VariablePool::new();
    pool.set(&Selector::new("n", "x"), value);
    pool
}

fn make_condition(op: ComparisonOperator, val: serde_json::Value) -> Condition {
    Condition {
        variable_selector: Selector::new("n", "x"),
        comparison_operator: op,
        value: val,
    }
}

fn bench_condition(c: &mut Criterion) {
    c.bench_function("eval_string_is", |b| {
        let pool = make_pool_with_value(Segment::String("hello".into()));
        let cond = make_condition(ComparisonOperator::Is, json!("hello"));
        b.iter(|| black_box(evaluate_condition(&cond, &pool)));
    });

    c.bench_function("eval_string_contains", |b| {
        let pool = make_pool_with_value(Segment::String("x".repeat(1024)));
        let cond = make_condition(ComparisonOperator::Contains, json!("abc"));
        b.iter(|| black_box(evaluate_condition(&cond, &pool)));
    });

    c.bench_function("eval_numeric_gt", |b| {
        let pool = make_pool_with_value(Segment::Integer(42));
        let cond = make_condition(ComparisonOperator::GreaterThan, json!(10));
        b.iter(|| black_box(evaluate_condition(&cond, &pool)));
    });

    for size in [10usize, 100] {
        c.bench_with_input(BenchmarkId::new("eval_in_items", size), &size, |b, size| {
            let pool = make_pool_with_value(Segment::String("item42".into()));
            let items: Vec<String> = (0..*size).map(|i| format!("item{}", i)).collect();
            let cond = make_condition(ComparisonOperator::In, json!(items));
            b.iter(|| black_box(evaluate_condition(&cond, &pool)));
        });
    }

    c.bench_function("eval_and_of_three", |b| {
        let pool = make_pool_with_value(Segment::Integer(42));
        let conds = vec![
            make_condition(ComparisonOperator::GreaterThan, json!(10)),
            make_condition(ComparisonOperator::LessThan, json!(100)),
            make_condition(ComparisonOperator::NotNull, json!(null)),
        ];
        b.iter(|| black_box(evaluate_conditions(LogicalOperator::And, &conds, &pool)));
    });
}

fn bench_pool_access(c: &mut Criterion) {
    let mut pool = VariablePool::new();
    for i in 0..100 {
        pool.set(
            &Selector::new(format!("node{}", i), "out"),
            Segment::from_value(&json!({ "items": [1, 2, 3], "name": format!("n{}", i) })),
        );
    }
    let deep = Selector::parse_str("node50.out.name").expect("selector");

    c.bench_function("pool_get_nested", |b| {
        b.iter(|| black_box(pool.get(&deep)));
    });

    c.bench_function("pool_snapshot", |b| {
        b.iter(|| black_box(pool.snapshot()));
    });

    c.bench_function("pool_clone_on_write", |b| {
        let shared = Arc::new(pool.clone());
        b.iter(|| {
            let mut owned = shared.clone();
            Arc::make_mut(&mut owned).set(&Selector::new("w", "v"), Segment::Integer(1));
            black_box(owned)
        });
    });
}

fn bench_branching_run(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("bench runtime");
    let graph = Arc::new(build_graph_from_dsl(BRANCHING_YAML, DslFormat::Yaml).expect("graph"));
    let registry = Arc::new(NodeRegistry::with_builtins());

    c.bench_function("run_if_else_graph", |b| {
        b.to_async(&rt).iter(|| async {
            let engine = GraphEngine::builder(graph.clone(), registry.clone()).build();
            let mut inputs = HashMap::new();
            inputs.insert("x".to_string(), json!(42));
            black_box(engine.run(inputs).await)
        });
    });
}

criterion_group!(benches, bench_condition, bench_pool_access, bench_branching_run);
criterion_main!(benches);
