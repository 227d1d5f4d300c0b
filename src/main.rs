use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use graphflow::core::{hook_fn, Decision};
use graphflow::{
    build_graph_from_dsl, DslFormat, ExecutionStatus, GraphEngine, MemorySuspensionRepository,
    NodeRegistry, SuspensionRepository, WorkflowError,
};

const DEMO_WORKFLOW: &str = r#"
version: "0.1.0"
nodes:
  - id: start
    data:
      type: start
      title: Start
      variables:
        - variable: query
          required: true
  - id: route
    data:
      type: if-else
      title: Has Query
      cases:
        - case_id: has_query
          logical_operator: and
          conditions:
            - variable_selector: ["start", "query"]
              comparison_operator: not_empty
  - id: review
    data:
      type: human-input
      title: Review
      prompt: "Approve this query?"
  - id: answer_yes
    data:
      type: answer
      title: Reviewed
      answer: "{{#start.query#}} -> {{#review.input#}}"
  - id: answer_no
    data:
      type: answer
      title: Empty
      answer: "No query provided."
edges:
  - source: start
    target: route
  - source: route
    target: review
    source_handle: has_query
  - source: route
    target: answer_no
    source_handle: "false"
  - source: review
    target: answer_yes
"#;

#[tokio::main]
async fn main() -> Result<(), WorkflowError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== graphflow demo ===\n");

    let graph = Arc::new(build_graph_from_dsl(DEMO_WORKFLOW, DslFormat::Yaml)?);
    let registry = Arc::new(NodeRegistry::with_builtins());
    let repository = Arc::new(MemorySuspensionRepository::new());

    let mut inputs = HashMap::new();
    inputs.insert("query".to_string(), json!("ship it"));

    let engine = GraphEngine::builder(graph.clone(), registry.clone())
        .repository(repository.clone())
        .hook(hook_fn(|params| {
            if params.step > 50 {
                Decision::Stop
            } else {
                Decision::Continue
            }
        }))
        .workflow_id("demo")
        .build();
    let first = engine.run(inputs).await?;
    println!("first leg: {}", first.status);

    if first.status != ExecutionStatus::Suspended {
        print_json(&first.outputs);
        return Ok(());
    }
    let Some(pending) = first.suspension else {
        return Err(WorkflowError::InternalError("suspended run has no record".to_string()));
    };
    println!("waiting on node '{}'", pending.next_node_id);

    let suspension = repository.take(&pending.id).await?;
    let mut answer = HashMap::new();
    answer.insert("input".to_string(), json!("approved"));

    let engine = GraphEngine::builder(graph, registry)
        .repository(repository.clone())
        .build();
    let second = engine.resume(suspension, answer).await?;
    println!("second leg: {}", second.status);
    print_json(&second.outputs);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render outputs: {}", e),
    }
}
