// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-run mutable state: node statuses, edge resolutions, outputs, and loop
//! counters. One `RunState` is owned by one executor run and never shared.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_flows::CompiledFlow;
use uuid::Uuid;

// ============================================================================
// Statuses
// ============================================================================

/// Lifecycle of a node within one run.
///
/// Transitions are forward-only (Pending -> Running -> Done/Failed), with one
/// exception: a fired edge into an already-settled target re-arms it back to
/// Pending so a bounded cycle can iterate. Skipped nodes settle as Done with
/// a skip marker in their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not yet scheduled
    Pending,
    /// Runner invocation in progress
    Running,
    /// Settled with an output (a value or a skip marker)
    Done,
    /// Settled after exhausting all attempts
    Failed,
}

impl NodeStatus {
    /// Whether the node has settled.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Resolution state of an edge within one run.
///
/// Normal edges resolve exactly once per source settle; in a cycle the source
/// may settle again after a re-arm, overwriting the previous resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    /// Source has not settled yet
    Pending,
    /// Source produced a value and the edge condition held
    Fired,
    /// Source failed/skipped, the edge condition was false, or the loop
    /// bound was reached
    Skipped,
}

impl EdgeStatus {
    /// Whether the edge has been resolved either way.
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fired => "fired",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Node Outputs
// ============================================================================

/// Marker stored for a node that settled without running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipMarker {
    /// Always true
    pub skipped: bool,
    /// `"edge"` when the gate over incoming edges was unsatisfied; absent
    /// when the node's own `when` condition was false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Marker stored for a node that exhausted all attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorMarker {
    /// Always true
    pub failed: bool,
    /// Final attempt's error
    pub error: ErrorDetail,
    /// Attempts consumed (equals the configured maximum)
    pub attempts: u32,
}

/// Error payload inside an [`ErrorMarker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorDetail {
    /// Human-readable message from the final attempt
    pub message: String,
}

/// What a settled node left behind: a raw value or a marker.
///
/// Serializes transparently, so downstream bindings and conditions see
/// exactly `{"skipped":true}`, `{"skipped":true,"reason":"edge"}`,
/// `{"failed":true,"error":{...},"attempts":n}`, or the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeOutput {
    /// Node was skipped without invoking its runner
    Skipped(SkipMarker),
    /// Node failed after exhausting attempts
    Failed(ErrorMarker),
    /// Runner result
    Value(Value),
}

impl NodeOutput {
    /// Skip marker for a false `when` condition.
    pub fn skipped() -> Self {
        Self::Skipped(SkipMarker {
            skipped: true,
            reason: None,
        })
    }

    /// Skip marker for an unsatisfied incoming-edge gate.
    pub fn edge_skipped() -> Self {
        Self::Skipped(SkipMarker {
            skipped: true,
            reason: Some("edge".to_string()),
        })
    }

    /// Error marker carrying the final attempt's message.
    pub fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self::Failed(ErrorMarker {
            failed: true,
            error: ErrorDetail {
                message: message.into(),
            },
            attempts,
        })
    }

    /// Runner value.
    pub fn value(value: Value) -> Self {
        Self::Value(value)
    }

    /// Whether this is a skip marker.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Whether this is an error marker.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The raw runner value, if the node actually ran.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Render for the binding context (markers keep their wire shape).
    pub fn to_context_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Mutable state of one flow run.
#[derive(Debug)]
pub struct RunState {
    run_id: Uuid,
    input: Value,
    node_status: HashMap<String, NodeStatus>,
    edge_status: HashMap<String, EdgeStatus>,
    outputs: HashMap<String, NodeOutput>,
    loop_counters: HashMap<String, u32>,
}

impl RunState {
    /// Fresh state for one run: every node Pending, every edge unresolved.
    pub fn new(flow: &CompiledFlow, run_id: Uuid, input: Value) -> Self {
        let node_status = flow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeStatus::Pending))
            .collect();
        let edge_status = flow
            .edges
            .iter()
            .map(|e| (e.key(), EdgeStatus::Pending))
            .collect();
        Self {
            run_id,
            input,
            node_status,
            edge_status,
            outputs: HashMap::new(),
            loop_counters: HashMap::new(),
        }
    }

    /// Run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Current status of a node (Pending for unknown ids).
    pub fn node_status(&self, node_id: &str) -> NodeStatus {
        self.node_status
            .get(node_id)
            .copied()
            .unwrap_or(NodeStatus::Pending)
    }

    /// Current resolution of an edge (by [`EdgeSpec::key`]).
    ///
    /// [`EdgeSpec::key`]: trellis_dsl::EdgeSpec::key
    pub fn edge_status(&self, edge_key: &str) -> EdgeStatus {
        self.edge_status
            .get(edge_key)
            .copied()
            .unwrap_or(EdgeStatus::Pending)
    }

    /// Output of a settled node, if any.
    pub fn output(&self, node_id: &str) -> Option<&NodeOutput> {
        self.outputs.get(node_id)
    }

    /// All node statuses.
    pub fn node_statuses(&self) -> &HashMap<String, NodeStatus> {
        &self.node_status
    }

    /// All settled outputs.
    pub fn outputs(&self) -> &HashMap<String, NodeOutput> {
        &self.outputs
    }

    /// Times a loop edge has fired so far.
    pub fn loop_count(&self, edge_key: &str) -> u32 {
        self.loop_counters.get(edge_key).copied().unwrap_or(0)
    }

    /// Context for binding resolution and condition evaluation:
    /// `{"input": ..., "nodes": {id: output}}`.
    pub fn binding_context(&self) -> Value {
        let mut nodes = serde_json::Map::new();
        for (id, output) in &self.outputs {
            nodes.insert(id.clone(), output.to_context_value());
        }
        serde_json::json!({ "input": self.input, "nodes": nodes })
    }

    pub(crate) fn set_node_status(&mut self, node_id: &str, status: NodeStatus) {
        self.node_status.insert(node_id.to_string(), status);
    }

    pub(crate) fn set_output(&mut self, node_id: &str, output: NodeOutput) {
        self.outputs.insert(node_id.to_string(), output);
    }

    pub(crate) fn resolve_edge(&mut self, edge_key: &str, status: EdgeStatus) {
        self.edge_status.insert(edge_key.to_string(), status);
    }

    /// Bump a loop edge's counter and return the new count.
    pub(crate) fn increment_loop(&mut self, edge_key: &str) -> u32 {
        let counter = self.loop_counters.entry(edge_key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Reset a settled node back to Pending and drop its output, so a cycle
    /// iteration runs it again.
    pub(crate) fn rearm(&mut self, node_id: &str) {
        self.node_status
            .insert(node_id.to_string(), NodeStatus::Pending);
        self.outputs.remove(node_id);
    }
}
