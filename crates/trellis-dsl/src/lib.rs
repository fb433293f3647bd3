// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow DSL Type Definitions - Single Source of Truth
//!
//! This crate defines the flow specification types used throughout the
//! codebase:
//! - Runtime deserialization of flow JSON
//! - Compiler type-safe access to the node/edge graph
//! - Auto-generation of JSON Schema via schemars
//!
//! A flow is a directed graph of typed nodes (agent calls, constants,
//! conditionals) connected by edges that carry gate semantics (AND/OR),
//! optional conditions, and optional bounded-loop markers. The types here are
//! pure data; validation lives in `trellis-flows` and execution in
//! `trellis-engine`.

use serde::{Deserialize, Serialize};

/// DSL version - bump when making breaking changes
pub const DSL_VERSION: &str = "1.2.0";

/// Condition expression types for `when` clauses.
pub mod condition;

/// Flow, node, and edge specification types.
pub mod types;

pub use condition::{ConditionAst, ConditionExpression, Operand};
pub use types::{EdgeSpec, FlowPolicy, FlowSpec, Gate, NodePolicy, NodeSpec, RetryPolicy};

// ============================================================================
// Parsing Functions
// ============================================================================

/// Parse a flow specification from a JSON value.
pub fn parse_flow(json: &serde_json::Value) -> Result<FlowSpec, String> {
    serde_json::from_value(json.clone()).map_err(|e| format!("Failed to parse flow: {}", e))
}

/// Parse a flow specification from a JSON string.
pub fn parse_flow_str(json: &str) -> Result<FlowSpec, String> {
    serde_json::from_str(json).map_err(|e| format!("Failed to parse flow: {}", e))
}

/// Metadata about a well-known node type for documentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    #[serde(rename = "type")]
    pub node_type: String,
    pub category: String,
    pub description: String,
}

/// Get metadata for the node types the engine treats specially.
///
/// Arbitrary node types are allowed (the runner registry decides what is
/// executable); these are the ones documented in the flow authoring guide.
pub fn builtin_node_types() -> Vec<NodeTypeInfo> {
    let mut types = vec![
        NodeTypeInfo {
            node_type: "agent".to_string(),
            category: "execution".to_string(),
            description: "Invokes an LLM agent through the runner registry".to_string(),
        },
        NodeTypeInfo {
            node_type: "constant".to_string(),
            category: "data".to_string(),
            description: "Emits its config value unchanged".to_string(),
        },
        NodeTypeInfo {
            node_type: "conditional".to_string(),
            category: "control".to_string(),
            description: "Settles immediately; routing happens on its outgoing edges".to_string(),
        },
    ];

    // Stable ordering for docs and schema output
    types.sort_by(|a, b| a.node_type.cmp(&b.node_type));

    types
}
