// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end executor tests: gates, conditions, bounded loops, retry and
//! timeout policies, and failure handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use trellis_engine::{
    FlowExecutor, NodeContext, NodeRegistry, NodeRunner, NodeStatus, TracingSink, ValueSchema,
};
use trellis_flows::CompiledFlow;

// ============================================================================
// Test Runners
// ============================================================================

struct Echo;

#[async_trait]
impl NodeRunner for Echo {
    async fn run(&self, _ctx: &NodeContext, input: Value) -> anyhow::Result<Value> {
        Ok(input)
    }
}

/// Counts invocations and returns the invocation number.
struct Counting {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl NodeRunner for Counting {
    async fn run(&self, _ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "call": n }))
    }
}

/// Fails the first `failures` invocations, then succeeds.
struct FailFirst {
    failures: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl NodeRunner for FailFirst {
    async fn run(&self, _ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            anyhow::bail!("transient failure on attempt {}", n);
        }
        Ok(json!({ "ok": true, "attempt": n }))
    }
}

struct AlwaysFail;

#[async_trait]
impl NodeRunner for AlwaysFail {
    async fn run(&self, _ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        anyhow::bail!("boom")
    }
}

/// Never completes; only a timeout can end an attempt.
struct Hang;

#[async_trait]
impl NodeRunner for Hang {
    async fn run(&self, _ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        futures::future::pending::<()>().await;
        unreachable!()
    }
}

/// Approves starting from the `approve_on`-th invocation.
struct Approver {
    approve_on: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl NodeRunner for Approver {
    async fn run(&self, _ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "approved": n >= self.approve_on, "round": n }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn compiled(json: Value) -> CompiledFlow {
    let flow = trellis_dsl::parse_flow(&json).expect("flow parses");
    trellis_flows::compile(&flow).expect("flow compiles")
}

/// Honor RUST_LOG when debugging a test run. Safe to call repeatedly.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn executor_with(runners: Vec<(&str, Arc<dyn NodeRunner>)>) -> FlowExecutor {
    init_tracing();
    let mut registry = NodeRegistry::builtin();
    for (node_type, runner) in runners {
        registry.register(node_type, runner);
    }
    FlowExecutor::new(registry)
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

// ============================================================================
// Linear and Gated Flows
// ============================================================================

#[tokio::test]
async fn linear_flow_passes_outputs_downstream() {
    let flow = compiled(json!({
        "name": "linear",
        "nodes": [
            { "id": "source", "type": "constant", "config": { "topic": "rust" } },
            { "id": "summary", "type": "echo", "input": { "topic": "{{ nodes.source.topic }}" } }
        ],
        "edges": [{ "from": "source", "to": "summary" }]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(report.node_status["source"], NodeStatus::Done);
    assert_eq!(report.node_status["summary"], NodeStatus::Done);
    assert_eq!(
        report.output_value("summary").unwrap(),
        &json!({ "topic": "rust" })
    );
}

#[tokio::test]
async fn and_gate_skips_when_a_branch_skipped() {
    let flow = compiled(json!({
        "nodes": [
            { "id": "start", "type": "constant", "config": 1 },
            { "id": "a", "type": "echo" },
            { "id": "b", "type": "echo", "when": "input.enableB" },
            { "id": "merge", "type": "echo" }
        ],
        "edges": [
            { "from": "start", "to": "a" },
            { "from": "start", "to": "b" },
            { "from": "a", "to": "merge" },
            { "from": "b", "to": "merge" }
        ]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let report = executor
        .run(&flow, json!({ "enableB": false }))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&report.outputs["b"]).unwrap(),
        json!({ "skipped": true })
    );
    assert_eq!(
        serde_json::to_value(&report.outputs["merge"]).unwrap(),
        json!({ "skipped": true, "reason": "edge" })
    );
    // Skips settle as Done; the run itself succeeded.
    assert_eq!(report.node_status["merge"], NodeStatus::Done);
}

#[tokio::test]
async fn or_gate_runs_with_one_fired_branch() {
    let flow = compiled(json!({
        "nodes": [
            { "id": "start", "type": "constant", "config": 1 },
            { "id": "a", "type": "echo" },
            { "id": "b", "type": "echo", "when": "input.enableB" },
            { "id": "merge", "type": "echo", "input": { "left": "{{ nodes.a }}" } }
        ],
        "edges": [
            { "from": "start", "to": "a" },
            { "from": "start", "to": "b" },
            { "from": "a", "to": "merge", "gate": "OR" },
            { "from": "b", "to": "merge", "gate": "OR" }
        ]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let report = executor
        .run(&flow, json!({ "enableB": false }))
        .await
        .unwrap();
    assert!(report.output_value("merge").is_some());
}

#[tokio::test]
async fn no_double_execution_in_acyclic_flow() {
    let calls = counter();
    let flow = compiled(json!({
        "nodes": [
            { "id": "start", "type": "tick" },
            { "id": "left", "type": "tick" },
            { "id": "right", "type": "tick" },
            { "id": "merge", "type": "tick" }
        ],
        "edges": [
            { "from": "start", "to": "left" },
            { "from": "start", "to": "right" },
            { "from": "left", "to": "merge" },
            { "from": "right", "to": "merge" }
        ]
    }));
    let executor = executor_with(vec![(
        "tick",
        Arc::new(Counting {
            calls: calls.clone(),
        }) as Arc<dyn NodeRunner>,
    )]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(report.node_status.values().all(|s| *s == NodeStatus::Done));
}

// ============================================================================
// Conditional Routing
// ============================================================================

#[tokio::test]
async fn edge_conditions_route_between_branches() {
    let flow = compiled(json!({
        "nodes": [
            { "id": "review", "type": "constant", "config": { "verdict": "approve" } },
            { "id": "publish", "type": "echo" },
            { "id": "revise", "type": "echo" }
        ],
        "edges": [
            { "from": "review", "to": "publish", "when": "nodes.review.verdict == \"approve\"" },
            { "from": "review", "to": "revise", "when": "nodes.review.verdict != \"approve\"" }
        ]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert!(report.output_value("publish").is_some());
    assert_eq!(
        serde_json::to_value(&report.outputs["revise"]).unwrap(),
        json!({ "skipped": true, "reason": "edge" })
    );
}

#[tokio::test]
async fn when_skip_takes_precedence_over_gate_skip() {
    // upstream is skipped, so target's gate is unsatisfied too; the false
    // `when` wins and the marker carries no reason.
    let flow = compiled(json!({
        "nodes": [
            { "id": "upstream", "type": "echo", "when": "input.enable" },
            { "id": "target", "type": "echo", "when": "input.enable" }
        ],
        "edges": [{ "from": "upstream", "to": "target" }]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let report = executor
        .run(&flow, json!({ "enable": false }))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&report.outputs["target"]).unwrap(),
        json!({ "skipped": true })
    );
}

#[tokio::test]
async fn builder_accepts_custom_event_sink() {
    init_tracing();
    let registry = NodeRegistry::builtin();
    let executor = FlowExecutor::builder(registry)
        .event_sink(Arc::new(TracingSink))
        .build();

    let flow = compiled(json!({
        "nodes": [{ "id": "only", "type": "constant", "config": "ok" }]
    }));
    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(report.output_value("only").unwrap(), &json!("ok"));
}

// ============================================================================
// Bounded Loops
// ============================================================================

#[tokio::test]
async fn loop_terminates_at_max_iterations() {
    let draft_calls = counter();
    let review_calls = counter();
    let flow = compiled(json!({
        "nodes": [
            { "id": "draft", "type": "draft" },
            { "id": "review", "type": "review" }
        ],
        "edges": [
            { "from": "draft", "to": "review" },
            { "from": "review", "to": "draft", "maxIterations": 3 }
        ]
    }));
    let executor = executor_with(vec![
        (
            "draft",
            Arc::new(Counting {
                calls: draft_calls.clone(),
            }) as Arc<dyn NodeRunner>,
        ),
        (
            "review",
            Arc::new(Counting {
                calls: review_calls.clone(),
            }) as Arc<dyn NodeRunner>,
        ),
    ]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    // Initial pass plus three loop iterations.
    assert_eq!(draft_calls.load(Ordering::SeqCst), 4);
    assert_eq!(review_calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.node_status["draft"], NodeStatus::Done);
    assert_eq!(report.node_status["review"], NodeStatus::Done);
}

#[tokio::test]
async fn loop_exits_early_when_condition_goes_false() {
    let draft_calls = counter();
    let review_calls = counter();
    let flow = compiled(json!({
        "nodes": [
            { "id": "draft", "type": "draft" },
            { "id": "review", "type": "approver" }
        ],
        "edges": [
            { "from": "draft", "to": "review" },
            {
                "from": "review",
                "to": "draft",
                "maxIterations": 10,
                "when": "nodes.review.approved == false"
            }
        ]
    }));
    let executor = executor_with(vec![
        (
            "draft",
            Arc::new(Counting {
                calls: draft_calls.clone(),
            }) as Arc<dyn NodeRunner>,
        ),
        (
            "approver",
            Arc::new(Approver {
                approve_on: 2,
                calls: review_calls.clone(),
            }) as Arc<dyn NodeRunner>,
        ),
    ]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(draft_calls.load(Ordering::SeqCst), 2);
    assert_eq!(review_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        report.output_value("review").unwrap(),
        &json!({ "approved": true, "round": 2 })
    );
}

#[tokio::test]
async fn unbounded_cycle_aborts_the_run() {
    let flow = compiled(json!({
        "nodes": [
            { "id": "a", "type": "echo" },
            { "id": "b", "type": "echo" }
        ],
        "edges": [
            { "from": "a", "to": "b" },
            { "from": "b", "to": "a" }
        ]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let err = executor.run(&flow, Value::Null).await.unwrap_err();
    assert_eq!(err.error_code(), "CYCLE_DETECTED");
}

// ============================================================================
// Retries, Timeouts, Failure Handling
// ============================================================================

#[tokio::test]
async fn retry_recovers_from_transient_failures() {
    let calls = counter();
    let flow = compiled(json!({
        "nodes": [{
            "id": "fetch",
            "type": "flaky",
            "policy": { "retry": { "maxAttempts": 3 } }
        }]
    }));
    let executor = executor_with(vec![(
        "flaky",
        Arc::new(FailFirst {
            failures: 2,
            calls: calls.clone(),
        }) as Arc<dyn NodeRunner>,
    )]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        report.output_value("fetch").unwrap(),
        &json!({ "ok": true, "attempt": 3 })
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_fast_by_default() {
    let flow = compiled(json!({
        "nodes": [{
            "id": "fetch",
            "type": "fail",
            "policy": { "retry": { "maxAttempts": 3, "backoffMs": 250 } }
        }]
    }));
    let executor = executor_with(vec![("fail", Arc::new(AlwaysFail) as Arc<dyn NodeRunner>)]);

    let err = executor.run(&flow, Value::Null).await.unwrap_err();
    assert_eq!(err.error_code(), "NODE_EXECUTION_FAILED");
    assert!(err.to_string().contains("boom"), "{}", err);
}

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_a_failed_attempt() {
    let flow = compiled(json!({
        "nodes": [{
            "id": "fetch",
            "type": "slow",
            "policy": {
                "timeoutMs": 100,
                "retry": { "maxAttempts": 2 },
                "continueOnError": true
            }
        }]
    }));
    let executor = executor_with(vec![("slow", Arc::new(Hang) as Arc<dyn NodeRunner>)]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(report.node_status["fetch"], NodeStatus::Failed);
    assert_eq!(
        serde_json::to_value(&report.outputs["fetch"]).unwrap(),
        json!({
            "failed": true,
            "error": { "message": "attempt timed out after 100ms" },
            "attempts": 2
        })
    );
}

#[tokio::test]
async fn continue_on_error_keeps_failure_branch_local() {
    let flow = compiled(json!({
        "nodes": [
            { "id": "bad", "type": "fail", "policy": { "continueOnError": true, "retry": { "maxAttempts": 2 } } },
            { "id": "after_bad", "type": "echo" },
            { "id": "good", "type": "constant", "config": 7 },
            { "id": "after_good", "type": "echo", "input": { "value": "{{ nodes.good }}" } }
        ],
        "edges": [
            { "from": "bad", "to": "after_bad" },
            { "from": "good", "to": "after_good" }
        ]
    }));
    let executor = executor_with(vec![
        ("fail", Arc::new(AlwaysFail) as Arc<dyn NodeRunner>),
        ("echo", Arc::new(Echo) as Arc<dyn NodeRunner>),
    ]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(report.node_status["bad"], NodeStatus::Failed);
    assert_eq!(
        serde_json::to_value(&report.outputs["bad"]).unwrap(),
        json!({ "failed": true, "error": { "message": "boom" }, "attempts": 2 })
    );
    // The failed node's dependent settles as an edge-skip...
    assert_eq!(
        serde_json::to_value(&report.outputs["after_bad"]).unwrap(),
        json!({ "skipped": true, "reason": "edge" })
    );
    // ...while the healthy branch runs to completion.
    assert_eq!(
        report.output_value("after_good").unwrap(),
        &json!({ "value": 7 })
    );
}

#[tokio::test]
async fn flow_level_fail_fast_false_continues_past_failures() {
    let flow = compiled(json!({
        "policy": { "failFast": false },
        "nodes": [
            { "id": "bad", "type": "fail" },
            { "id": "dependent", "type": "echo" },
            { "id": "independent", "type": "constant", "config": "ok" }
        ],
        "edges": [{ "from": "bad", "to": "dependent" }]
    }));
    let executor = executor_with(vec![
        ("fail", Arc::new(AlwaysFail) as Arc<dyn NodeRunner>),
        ("echo", Arc::new(Echo) as Arc<dyn NodeRunner>),
    ]);

    let report = executor.run(&flow, Value::Null).await.unwrap();
    assert_eq!(report.node_status["bad"], NodeStatus::Failed);
    assert_eq!(
        serde_json::to_value(&report.outputs["dependent"]).unwrap(),
        json!({ "skipped": true, "reason": "edge" })
    );
    assert_eq!(report.output_value("independent").unwrap(), &json!("ok"));
}

// ============================================================================
// Engine Faults
// ============================================================================

#[tokio::test]
async fn unknown_node_type_aborts_the_run() {
    let flow = compiled(json!({
        "nodes": [{ "id": "mystery", "type": "unregistered" }]
    }));
    let executor = executor_with(vec![]);

    let err = executor.run(&flow, Value::Null).await.unwrap_err();
    assert_eq!(err.error_code(), "SCHEDULING_ERROR");
    assert!(err.to_string().contains("unregistered"));
}

#[tokio::test]
async fn missing_binding_reference_aborts_the_run() {
    let flow = compiled(json!({
        "nodes": [{
            "id": "summary",
            "type": "echo",
            "input": { "text": "{{ nodes.ghost.content }}" }
        }]
    }));
    let executor = executor_with(vec![("echo", Arc::new(Echo) as Arc<dyn NodeRunner>)]);

    let err = executor.run(&flow, Value::Null).await.unwrap_err();
    assert_eq!(err.error_code(), "MISSING_REQUIRED_FIELD");
}

#[tokio::test]
async fn input_schema_rejection_aborts_the_run() {
    let mut registry = NodeRegistry::builtin();
    registry.register_with_schemas(
        "agent",
        Arc::new(Echo),
        Some(ValueSchema::object_with_required(&["topic"])),
        None,
    );
    let executor = FlowExecutor::new(registry);

    let flow = compiled(json!({
        "nodes": [{ "id": "draft", "type": "agent" }]
    }));
    let err = executor.run(&flow, Value::Null).await.unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_VALIDATION_ERROR");
    assert!(err.to_string().contains("topic"));
}
