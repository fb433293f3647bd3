// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Readiness query over a compiled flow and its run state.
//!
//! A Pending node is ready once every non-loop incoming edge has resolved
//! (fired or skipped). Whether the node then actually runs is the executor's
//! gate check; the scheduler only answers "nothing upstream is still open".
//! Loop edges never count toward readiness, otherwise a cycle could never
//! start.

use trellis_flows::CompiledFlow;

use crate::state::{NodeStatus, RunState};

/// Nodes ready to execute, in node declaration order.
///
/// Pure query: calling it repeatedly without state changes returns the same
/// list. Running and settled nodes are never emitted.
pub fn next_ready_nodes(state: &RunState, flow: &CompiledFlow) -> Vec<String> {
    flow.nodes
        .iter()
        .filter(|node| state.node_status(&node.id) == NodeStatus::Pending)
        .filter(|node| {
            flow.incoming_edges(&node.id)
                .filter(|edge| !edge.is_loop())
                .all(|edge| state.edge_status(&edge.key()).is_resolved())
        })
        .map(|node| node.id.clone())
        .collect()
}
