// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow execution loop.
//!
//! The executor repeatedly asks the scheduler for ready nodes and settles
//! them in declaration order. Settling a node resolves its outgoing edges,
//! which may make further nodes ready or, through a fired edge into an
//! already-settled target, re-arm a cycle for another iteration. The run ends
//! when the scheduler has nothing left.
//!
//! Collaborators (runner registry, binding resolver, condition evaluator,
//! event sink) are injected through the builder. There are no ambient
//! globals; two executors with different registries can run side by side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use trellis_dsl::{EdgeSpec, Gate, NodeSpec};
use trellis_flows::CompiledFlow;
use uuid::Uuid;

use crate::condition::{ConditionEvaluator, DefaultConditionEvaluator};
use crate::error::EngineError;
use crate::events::{EventSink, FlowEvent, NoopSink};
use crate::resolve::{BindingResolver, TemplateResolver};
use crate::runner::{NodeContext, NodeRegistry, RegistryEntry};
use crate::scheduler::next_ready_nodes;
use crate::state::{EdgeStatus, NodeOutput, NodeStatus, RunState};

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// When the run began
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Final status of every node
    pub node_status: HashMap<String, NodeStatus>,
    /// Final outputs (values and markers)
    pub outputs: HashMap<String, NodeOutput>,
}

impl RunReport {
    /// The raw value a node produced, if it ran to completion.
    pub fn output_value(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id).and_then(|o| o.as_value())
    }
}

/// Builder for [`FlowExecutor`]. The registry is required up front; the
/// remaining collaborators default to the built-in implementations.
pub struct FlowExecutorBuilder {
    registry: Arc<NodeRegistry>,
    resolver: Arc<dyn BindingResolver>,
    conditions: Arc<dyn ConditionEvaluator>,
    sink: Arc<dyn EventSink>,
}

impl FlowExecutorBuilder {
    /// Start a builder around a runner registry.
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            resolver: Arc::new(TemplateResolver),
            conditions: Arc::new(DefaultConditionEvaluator),
            sink: Arc::new(NoopSink),
        }
    }

    /// Replace the binding resolver.
    pub fn binding_resolver(mut self, resolver: Arc<dyn BindingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the condition evaluator.
    pub fn condition_evaluator(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Replace the event sink.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Finish the builder.
    pub fn build(self) -> FlowExecutor {
        FlowExecutor {
            registry: self.registry,
            resolver: self.resolver,
            conditions: self.conditions,
            sink: self.sink,
        }
    }
}

/// Executes compiled flows.
pub struct FlowExecutor {
    registry: Arc<NodeRegistry>,
    resolver: Arc<dyn BindingResolver>,
    conditions: Arc<dyn ConditionEvaluator>,
    sink: Arc<dyn EventSink>,
}

impl FlowExecutor {
    /// Executor with default collaborators.
    pub fn new(registry: NodeRegistry) -> Self {
        FlowExecutorBuilder::new(registry).build()
    }

    /// Builder for customizing collaborators.
    pub fn builder(registry: NodeRegistry) -> FlowExecutorBuilder {
        FlowExecutorBuilder::new(registry)
    }

    /// Run a compiled flow to quiescence.
    ///
    /// Fatal node failures (no `continueOnError`, flow `failFast` true)
    /// abort with `NODE_EXECUTION_FAILED`. A run that stalls with pending
    /// nodes hit an unbounded cycle and aborts with `CYCLE_DETECTED`.
    pub async fn run(&self, flow: &CompiledFlow, input: Value) -> Result<RunReport, EngineError> {
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let started = std::time::Instant::now();
        let mut state = RunState::new(flow, run_id, input);

        self.sink.emit(&FlowEvent::RunStarted {
            run_id,
            flow_name: flow.name.clone(),
        });
        tracing::debug!(%run_id, nodes = flow.nodes.len(), "run starting");

        loop {
            let ready = next_ready_nodes(&state, flow);
            if ready.is_empty() {
                break;
            }
            for node_id in ready {
                // An earlier node in this batch may have re-armed or raced
                // past this one; re-check before executing.
                if state.node_status(&node_id) != NodeStatus::Pending {
                    continue;
                }
                self.execute_node(flow, &mut state, &node_id).await?;
            }
        }

        let stalled: Vec<String> = flow
            .nodes
            .iter()
            .filter(|n| !state.node_status(&n.id).is_settled())
            .map(|n| n.id.clone())
            .collect();
        if !stalled.is_empty() {
            return Err(EngineError::CycleDetected { node_ids: stalled });
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.sink.emit(&FlowEvent::RunCompleted {
            run_id,
            duration_ms,
        });

        Ok(RunReport {
            run_id,
            started_at,
            duration_ms,
            node_status: state.node_statuses().clone(),
            outputs: state.outputs().clone(),
        })
    }

    async fn execute_node(
        &self,
        flow: &CompiledFlow,
        state: &mut RunState,
        node_id: &str,
    ) -> Result<(), EngineError> {
        let node = flow
            .node(node_id)
            .ok_or_else(|| EngineError::Scheduling {
                message: format!("ready node '{}' is not in the flow", node_id),
            })?
            .clone();

        // Node-level condition first: when both the condition is false and
        // the gate is unsatisfied, the stored marker is the plain when-skip.
        if let Some(when) = &node.when {
            let context = state.binding_context();
            if !self.conditions.evaluate(when, &context)? {
                self.settle_skipped(flow, state, &node, NodeOutput::skipped(), "when")?;
                return Ok(());
            }
        }

        // Gate check over resolved non-loop incoming edges.
        if !self.gate_satisfied(flow, state, node_id) {
            self.settle_skipped(flow, state, &node, NodeOutput::edge_skipped(), "edge")?;
            return Ok(());
        }

        let entry = self
            .registry
            .get(&node.node_type)
            .ok_or_else(|| EngineError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;

        let context = state.binding_context();
        let mut input = self.resolver.resolve(&node, &context)?;
        if let Some(schema) = entry.input_schema() {
            input = schema
                .parse(input)
                .map_err(|message| EngineError::SchemaValidation {
                    node_id: node.id.clone(),
                    message,
                })?;
        }

        state.set_node_status(node_id, NodeStatus::Running);
        match self.run_attempts(state.run_id(), &node, entry, input).await? {
            Ok(value) => {
                state.set_output(node_id, NodeOutput::value(value));
                state.set_node_status(node_id, NodeStatus::Done);
                self.sink.emit(&FlowEvent::NodeCompleted {
                    node_id: node.id.clone(),
                });
                self.resolve_outgoing(flow, state, node_id)?;
                Ok(())
            }
            Err(message) => {
                let attempts = node.max_attempts().max(1);
                state.set_output(node_id, NodeOutput::failed(&message, attempts));
                state.set_node_status(node_id, NodeStatus::Failed);
                self.sink.emit(&FlowEvent::NodeFailed {
                    node_id: node.id.clone(),
                    attempts,
                    message: message.clone(),
                });

                let fatal = flow.fail_fast && !node.continue_on_error();
                if fatal {
                    return Err(EngineError::NodeFailed {
                        node_id: node.id.clone(),
                        attempts,
                        message,
                    });
                }
                self.resolve_outgoing(flow, state, node_id)?;
                Ok(())
            }
        }
    }

    /// Invoke the runner up to `maxAttempts` times. The outer `Result` is
    /// for engine faults (schema rejections); the inner one distinguishes a
    /// successful value from an exhausted node.
    async fn run_attempts(
        &self,
        run_id: Uuid,
        node: &NodeSpec,
        entry: &RegistryEntry,
        input: Value,
    ) -> Result<Result<Value, String>, EngineError> {
        let max_attempts = node.max_attempts().max(1);
        let backoff_ms = node.backoff_ms();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 && backoff_ms > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            self.sink.emit(&FlowEvent::NodeStarted {
                node_id: node.id.clone(),
                attempt,
            });

            let ctx = NodeContext {
                run_id,
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                attempt,
                config: node.config.clone(),
            };
            let attempt_future = entry.runner().run(&ctx, input.clone());
            let outcome = match node.timeout_ms() {
                Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), attempt_future)
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("attempt timed out after {}ms", ms)),
                },
                None => attempt_future.await,
            };

            match outcome {
                Ok(value) => {
                    let value = match entry.output_schema() {
                        Some(schema) => {
                            schema
                                .parse(value)
                                .map_err(|message| EngineError::SchemaValidation {
                                    node_id: node.id.clone(),
                                    message,
                                })?
                        }
                        None => value,
                    };
                    return Ok(Ok(value));
                }
                Err(error) => {
                    last_error = format!("{:#}", error);
                    tracing::warn!(
                        node_id = %node.id,
                        attempt,
                        max_attempts,
                        error = %last_error,
                        "node attempt failed"
                    );
                }
            }
        }

        Ok(Err(last_error))
    }

    fn gate_satisfied(&self, flow: &CompiledFlow, state: &RunState, node_id: &str) -> bool {
        let mut any = false;
        let mut all_fired = true;
        let mut any_fired = false;
        for edge in flow.incoming_edges(node_id).filter(|e| !e.is_loop()) {
            any = true;
            match state.edge_status(&edge.key()) {
                EdgeStatus::Fired => any_fired = true,
                _ => all_fired = false,
            }
        }
        if !any {
            return true;
        }
        match flow.gate(node_id) {
            Gate::And => all_fired,
            Gate::Or => any_fired,
        }
    }

    fn settle_skipped(
        &self,
        flow: &CompiledFlow,
        state: &mut RunState,
        node: &NodeSpec,
        output: NodeOutput,
        reason: &'static str,
    ) -> Result<(), EngineError> {
        state.set_output(&node.id, output);
        state.set_node_status(&node.id, NodeStatus::Done);
        self.sink.emit(&FlowEvent::NodeSkipped {
            node_id: node.id.clone(),
            reason,
        });
        self.resolve_outgoing(flow, state, &node.id)
    }

    /// Resolve every outgoing edge of a freshly settled node.
    ///
    /// An edge fires when the source produced a real value and its `when`
    /// (default true) holds. Failed and skipped sources skip all outgoing
    /// edges, so OR siblings still resolve and AND dependents settle as
    /// edge-skips instead of waiting forever. A fired edge into an
    /// already-settled target re-arms it; that path is only reachable inside
    /// a cycle.
    fn resolve_outgoing(
        &self,
        flow: &CompiledFlow,
        state: &mut RunState,
        node_id: &str,
    ) -> Result<(), EngineError> {
        let source_produced_value = state
            .output(node_id)
            .map(|o| o.as_value().is_some())
            .unwrap_or(false);
        let context = state.binding_context();
        let edges: Vec<EdgeSpec> = flow.outgoing_edges(node_id).cloned().collect();

        for edge in edges {
            let key = edge.key();
            let mut fired = source_produced_value;
            if fired && let Some(when) = &edge.when {
                fired = self.conditions.evaluate(when, &context)?;
            }

            if edge.is_loop() && fired {
                let max = edge.max_iterations.unwrap_or(0);
                if state.loop_count(&key) >= max {
                    // Bound reached: the edge is forced to skipped and the
                    // cycle stops iterating.
                    fired = false;
                } else {
                    let iteration = state.increment_loop(&key);
                    self.sink.emit(&FlowEvent::LoopIteration {
                        edge_key: key.clone(),
                        iteration,
                    });
                }
            }

            let status = if fired {
                EdgeStatus::Fired
            } else {
                EdgeStatus::Skipped
            };
            state.resolve_edge(&key, status);
            self.sink.emit(&FlowEvent::EdgeResolved {
                edge_key: key.clone(),
                status,
            });

            if fired && state.node_status(&edge.to).is_settled() {
                tracing::debug!(edge_key = %key, target = %edge.to, "re-arming settled target");
                state.rearm(&edge.to);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("registry", &self.registry)
            .finish()
    }
}
