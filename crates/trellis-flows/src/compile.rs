// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Graph compilation: derive the indices the scheduler needs from a
//! validated flow.
//!
//! Compilation is O(N+E): one pass over nodes seeding the adjacency and
//! incoming maps, one pass over edges populating them and the per-node gate
//! rule. Conflicting gate declarations into the same node fail immediately.
//!
//! There is deliberately **no cycle detection** here: cycles are how bounded
//! loops are expressed (`maxIterations` edges), and the executor's loop
//! counters are the sole termination guard.

use std::collections::HashMap;

use trellis_dsl::{EdgeSpec, FlowSpec, Gate, NodeSpec};

use crate::validation::{ValidationResult, validate_flow};

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CompileError {
    /// The flow failed structural validation. Carries every problem found.
    InvalidFlow {
        /// Itemized validation failures.
        result: ValidationResult,
    },

    /// Two edges into the same node declare different gates.
    GateConflict {
        /// The node whose incoming edges disagree.
        node_id: String,
        /// Gate declared by an earlier edge.
        existing: Gate,
        /// Gate declared by the conflicting edge.
        conflicting: Gate,
        /// Key of the edge that introduced the conflict.
        edge_key: String,
    },
}

impl CompileError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFlow { .. } => "INVALID_FLOW_DEFINITION",
            Self::GateConflict { .. } => "GATE_CONFLICT",
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFlow { result } => {
                writeln!(f, "Flow definition is invalid:")?;
                for error in &result.errors {
                    writeln!(f, "  {}", error)?;
                }
                Ok(())
            }
            Self::GateConflict {
                node_id,
                existing,
                conflicting,
                edge_key,
            } => {
                write!(
                    f,
                    "Conflicting gates into node '{}': edge '{}' declares {} but an earlier edge declared {}",
                    node_id, edge_key, conflicting, existing
                )
            }
        }
    }
}

impl std::error::Error for CompileError {}

// ============================================================================
// Compiled Flow
// ============================================================================

/// Derived, read-only view of a validated flow.
///
/// Built once per flow definition and safe to reuse across many runs - it
/// carries no per-run state. Edges are referenced by index into [`edges`]
/// so the same `EdgeSpec` is never duplicated between the adjacency and
/// incoming maps.
///
/// [`edges`]: CompiledFlow::edges
#[derive(Debug, Clone)]
pub struct CompiledFlow {
    /// Flow name, if the document carried one.
    pub name: Option<String>,

    /// Nodes in declaration order (the scheduling tie-break).
    pub nodes: Vec<NodeSpec>,

    /// Edges in declaration order.
    pub edges: Vec<EdgeSpec>,

    /// Node id -> indices of outgoing edges, in edge declaration order.
    pub adjacency: HashMap<String, Vec<usize>>,

    /// Node id -> indices of incoming edges, in edge declaration order.
    pub incoming: HashMap<String, Vec<usize>>,

    /// Node id -> gate rule for its incoming edges.
    pub gate_by_node: HashMap<String, Gate>,

    /// Whether a fatal node failure aborts the run.
    pub fail_fast: bool,

    node_index: HashMap<String, usize>,
}

impl CompiledFlow {
    /// Look up a node by id.
    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.node_index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Incoming edges of a node, in declaration order.
    pub fn incoming_edges(&self, node_id: &str) -> impl Iterator<Item = &EdgeSpec> {
        self.incoming
            .get(node_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing_edges(&self, node_id: &str) -> impl Iterator<Item = &EdgeSpec> {
        self.adjacency
            .get(node_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Gate rule for a node (default: AND).
    pub fn gate(&self, node_id: &str) -> Gate {
        self.gate_by_node.get(node_id).copied().unwrap_or_default()
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a flow into a [`CompiledFlow`].
///
/// Runs structural validation first; any error fails compilation as
/// `INVALID_FLOW_DEFINITION` carrying the full itemized list. Gate conflicts
/// are detected during the edge pass and fail immediately.
pub fn compile(flow: &FlowSpec) -> Result<CompiledFlow, CompileError> {
    let result = validate_flow(flow);
    if result.has_errors() {
        return Err(CompileError::InvalidFlow { result });
    }
    for warning in &result.warnings {
        tracing::warn!(flow = flow.name.as_deref().unwrap_or("<unnamed>"), %warning, "flow lint");
    }

    // Pass 1: seed per-node maps so every node has an entry, edges or not.
    let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
    let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
    let mut node_index: HashMap<String, usize> = HashMap::new();
    for (i, node) in flow.nodes.iter().enumerate() {
        adjacency.insert(node.id.clone(), Vec::new());
        incoming.insert(node.id.clone(), Vec::new());
        node_index.insert(node.id.clone(), i);
    }

    // Pass 2: populate indices and resolve the gate rule per target node.
    let mut gate_by_node: HashMap<String, Gate> = HashMap::new();
    for (i, edge) in flow.edges.iter().enumerate() {
        adjacency
            .get_mut(&edge.from)
            .expect("validated edge source")
            .push(i);
        incoming
            .get_mut(&edge.to)
            .expect("validated edge target")
            .push(i);

        if let Some(declared) = edge.gate {
            match gate_by_node.get(&edge.to) {
                Some(&existing) if existing != declared => {
                    return Err(CompileError::GateConflict {
                        node_id: edge.to.clone(),
                        existing,
                        conflicting: declared,
                        edge_key: edge.key(),
                    });
                }
                _ => {
                    gate_by_node.insert(edge.to.clone(), declared);
                }
            }
        }
    }

    tracing::debug!(
        flow = flow.name.as_deref().unwrap_or("<unnamed>"),
        nodes = flow.nodes.len(),
        edges = flow.edges.len(),
        "flow compiled"
    );

    Ok(CompiledFlow {
        name: flow.name.clone(),
        nodes: flow.nodes.clone(),
        edges: flow.edges.clone(),
        adjacency,
        incoming,
        gate_by_node,
        fail_fast: flow.fail_fast(),
        node_index,
    })
}

// ============================================================================
// Tests
// ============================================================================
