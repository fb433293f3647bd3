// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow, node, and edge specification types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::condition::ConditionExpression;

// ============================================================================
// Root Types
// ============================================================================

/// Complete flow definition: a directed graph of nodes and edges plus
/// flow-level policy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowSpec {
    /// Human-readable name for the flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Detailed description of what the flow does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nodes in declaration order. Declaration order is the scheduling
    /// tie-break, so it is a `Vec`, not a map.
    pub nodes: Vec<NodeSpec>,

    /// Directed edges between nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeSpec>,

    /// Flow-level execution policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<FlowPolicy>,
}

impl FlowSpec {
    /// Whether a node failure aborts the whole run (default: true).
    pub fn fail_fast(&self) -> bool {
        self.policy.as_ref().map(|p| p.fail_fast).unwrap_or(true)
    }
}

/// Flow-level execution policy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowPolicy {
    /// Abort the entire run on the first fatal node failure (default: true).
    /// When false, failures are branch-local: dependents of the failed node
    /// settle as edge-skips instead of running.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A node in the flow graph.
///
/// `node_type` is a key into the runner registry; the engine itself does not
/// interpret it. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Unique node identifier. Must match `^[A-Za-z_][A-Za-z0-9_]*$`.
    pub id: String,

    /// Node type key into the runner registry (e.g., "agent", "constant")
    #[serde(rename = "type")]
    pub node_type: String,

    /// Input bindings: destination field name to a literal JSON value or a
    /// string carrying `{{ path }}` references resolved at execution time.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input: HashMap<String, serde_json::Value>,

    /// Opaque per-type configuration, passed to the runner unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Conditional expression gating execution. Evaluates against the
    /// accumulated bindings; false means the node settles as skipped without
    /// invoking its runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<ConditionExpression>,

    /// Per-node execution policy (timeout, retries, failure handling)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<NodePolicy>,
}

impl NodeSpec {
    /// Timeout for a single runner attempt, if configured.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.policy.as_ref().and_then(|p| p.timeout_ms)
    }

    /// Maximum runner attempts (default: 1).
    pub fn max_attempts(&self) -> u32 {
        self.policy
            .as_ref()
            .and_then(|p| p.retry.as_ref())
            .map(|r| r.max_attempts)
            .unwrap_or(1)
    }

    /// Delay between attempts in milliseconds (default: 0).
    pub fn backoff_ms(&self) -> u64 {
        self.policy
            .as_ref()
            .and_then(|p| p.retry.as_ref())
            .map(|r| r.backoff_ms)
            .unwrap_or(0)
    }

    /// Whether the run continues past a terminal failure of this node.
    pub fn continue_on_error(&self) -> bool {
        self.policy
            .as_ref()
            .and_then(|p| p.continue_on_error)
            .unwrap_or(false)
    }
}

/// Per-node execution policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePolicy {
    /// Timeout per runner attempt in milliseconds. A timed-out attempt is
    /// abandoned and counted as a failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Retry configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Continue the run past a terminal failure of this node (default: false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
}

/// Retry configuration for a node's runner invocations
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds (default: 0)
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Gate semantics for a node's incoming edges.
///
/// All edges into one node must declare the same gate; the compiler rejects
/// conflicting declarations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, strum::Display,
)]
pub enum Gate {
    /// Node executes only if every resolved incoming edge fired
    #[default]
    #[serde(rename = "AND", alias = "and", alias = "all")]
    #[strum(serialize = "AND")]
    And,

    /// Node executes if at least one incoming edge fired
    #[serde(rename = "OR", alias = "or", alias = "any")]
    #[strum(serialize = "OR")]
    Or,
}

/// A directed edge `from -> to`.
///
/// Presence of `max_iterations` marks the edge as a loop edge - there is no
/// separate flag. Loop edges do not participate in readiness or gate
/// computation; the executor's loop-iteration logic resolves them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    /// Edge identifier; defaults to `"<from>-><to>"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Source node ID
    pub from: String,

    /// Target node ID
    pub to: String,

    /// Gate declared for the target node (default: AND)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,

    /// Conditional expression evaluated against accumulated outputs when the
    /// source node settles; false resolves the edge as skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<ConditionExpression>,

    /// Upper bound on how many times this edge may fire. Marks the edge as a
    /// loop edge; once the counter reaches this value the edge is forced to
    /// skipped regardless of its condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl EdgeSpec {
    /// Stable key for this edge: declared id or `"<from>-><to>"`.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}->{}", self.from, self.to),
        }
    }

    /// Whether this edge is a loop edge.
    pub fn is_loop(&self) -> bool {
        self.max_iterations.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_default_and_explicit() {
        let edge: EdgeSpec = serde_json::from_value(serde_json::json!({
            "from": "a", "to": "b"
        }))
        .unwrap();
        assert_eq!(edge.key(), "a->b");
        assert!(!edge.is_loop());

        let edge: EdgeSpec = serde_json::from_value(serde_json::json!({
            "id": "retry-loop", "from": "a", "to": "b", "maxIterations": 3
        }))
        .unwrap();
        assert_eq!(edge.key(), "retry-loop");
        assert!(edge.is_loop());
    }

    #[test]
    fn test_gate_aliases() {
        let gate: Gate = serde_json::from_str("\"AND\"").unwrap();
        assert_eq!(gate, Gate::And);
        let gate: Gate = serde_json::from_str("\"any\"").unwrap();
        assert_eq!(gate, Gate::Or);
        let gate: Gate = serde_json::from_str("\"or\"").unwrap();
        assert_eq!(gate, Gate::Or);
        assert_eq!(Gate::Or.to_string(), "OR");
    }

    #[test]
    fn test_gate_default_is_and() {
        assert_eq!(Gate::default(), Gate::And);
    }

    #[test]
    fn test_node_policy_defaults() {
        let node: NodeSpec = serde_json::from_value(serde_json::json!({
            "id": "n", "type": "agent"
        }))
        .unwrap();
        assert_eq!(node.max_attempts(), 1);
        assert_eq!(node.backoff_ms(), 0);
        assert_eq!(node.timeout_ms(), None);
        assert!(!node.continue_on_error());
    }

    #[test]
    fn test_node_policy_parsing() {
        let node: NodeSpec = serde_json::from_value(serde_json::json!({
            "id": "n",
            "type": "agent",
            "policy": {
                "timeoutMs": 50,
                "retry": { "maxAttempts": 3, "backoffMs": 10 },
                "continueOnError": true
            }
        }))
        .unwrap();
        assert_eq!(node.timeout_ms(), Some(50));
        assert_eq!(node.max_attempts(), 3);
        assert_eq!(node.backoff_ms(), 10);
        assert!(node.continue_on_error());
    }

    #[test]
    fn test_fail_fast_default() {
        let flow: FlowSpec = serde_json::from_value(serde_json::json!({
            "nodes": [{ "id": "a", "type": "agent" }]
        }))
        .unwrap();
        assert!(flow.fail_fast());

        let flow: FlowSpec = serde_json::from_value(serde_json::json!({
            "nodes": [{ "id": "a", "type": "agent" }],
            "policy": { "failFast": false }
        }))
        .unwrap();
        assert!(!flow.fail_fast());
    }
}
