// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow validation for structural correctness.
//!
//! This module validates flows before compilation to ensure:
//! - Node ids are well-formed and unique
//! - Edges reference existing nodes
//! - Retry/loop/timeout configuration is sane
//!
//! Validation never fails fast: a single pass reports every problem found,
//! so authors fix a flow in one round trip.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use trellis_dsl::FlowSpec;

// ============================================================================
// Validation Result Types
// ============================================================================

/// Result of flow validation containing errors and warnings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    /// Hard errors that prevent compilation.
    pub errors: Vec<ValidationError>,
    /// Soft warnings that don't prevent compilation but indicate potential issues.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Errors that can occur during validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
#[allow(missing_docs)] // Fields are self-documenting from variant docs
pub enum ValidationError {
    /// Flow has no nodes defined.
    EmptyFlow,

    /// A node id does not match `^[A-Za-z_][A-Za-z0-9_]*$`.
    InvalidNodeId { node_id: String },

    /// Two nodes declare the same id.
    DuplicateNodeId { node_id: String },

    /// A node has an empty `type` field.
    MissingNodeType { node_id: String },

    /// An edge endpoint references a node that does not exist.
    DanglingEdgeEndpoint {
        edge_key: String,
        endpoint: String,
        node_id: String,
        available_nodes: Vec<String>,
    },

    /// A retry policy declares zero attempts.
    ZeroMaxAttempts { node_id: String },

    /// A loop edge declares zero iterations.
    ZeroMaxIterations { edge_key: String },
}

impl ValidationError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyFlow => "INVALID_FLOW_DEFINITION",
            Self::InvalidNodeId { .. }
            | Self::DuplicateNodeId { .. }
            | Self::MissingNodeType { .. }
            | Self::ZeroMaxAttempts { .. } => "INVALID_NODE_DEFINITION",
            Self::DanglingEdgeEndpoint { .. } | Self::ZeroMaxIterations { .. } => {
                "INVALID_EDGE_DEFINITION"
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyFlow => {
                write!(f, "[E001] Flow has no nodes defined")
            }
            ValidationError::InvalidNodeId { node_id } => {
                write!(
                    f,
                    "[E002] Node id '{}' is invalid: ids must start with a letter or underscore \
                     and contain only letters, digits, and underscores",
                    node_id
                )
            }
            ValidationError::DuplicateNodeId { node_id } => {
                write!(f, "[E003] Node id '{}' is declared more than once", node_id)
            }
            ValidationError::MissingNodeType { node_id } => {
                write!(f, "[E004] Node '{}' has an empty type", node_id)
            }
            ValidationError::DanglingEdgeEndpoint {
                edge_key,
                endpoint,
                node_id,
                available_nodes,
            } => {
                let suggestion = find_similar_name(node_id, available_nodes);
                let suggestion_text = suggestion
                    .map(|s| format!(". Did you mean '{}'?", s))
                    .unwrap_or_default();
                write!(
                    f,
                    "[E010] Edge '{}' {} references node '{}' which does not exist{}",
                    edge_key, endpoint, node_id, suggestion_text
                )
            }
            ValidationError::ZeroMaxAttempts { node_id } => {
                write!(
                    f,
                    "[E020] Node '{}' declares retry.maxAttempts = 0; at least one attempt is required",
                    node_id
                )
            }
            ValidationError::ZeroMaxIterations { edge_key } => {
                write!(
                    f,
                    "[E021] Loop edge '{}' declares maxIterations = 0; it could never fire",
                    edge_key
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// Validation Warnings
// ============================================================================

// Thresholds for configuration warnings
const MAX_ATTEMPTS_RECOMMENDED: u32 = 10;
const MAX_BACKOFF_MS: u64 = 600_000; // 10 minutes
const MAX_TIMEOUT_MS: u64 = 3_600_000; // 1 hour
const MAX_ITERATIONS_RECOMMENDED: u32 = 1_000;

/// Warnings that indicate potential issues but don't prevent compilation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
#[allow(missing_docs)] // Fields are self-documenting from variant docs
pub enum ValidationWarning {
    /// High retry count may cause long execution times.
    HighRetryCount {
        node_id: String,
        max_attempts: u32,
        recommended_max: u32,
    },

    /// Long backoff delay may cause long execution times.
    LongBackoff {
        node_id: String,
        backoff_ms: u64,
        recommended_max_ms: u64,
    },

    /// Long timeout configured.
    LongTimeout {
        node_id: String,
        timeout_ms: u64,
        recommended_max_ms: u64,
    },

    /// High max iterations may indicate an unintended hot loop.
    HighMaxIterations {
        edge_key: String,
        max_iterations: u32,
        recommended_max: u32,
    },

    /// A node is unreachable: it has incoming edges but no path from any root.
    UnreachableNode { node_id: String },

    /// A self-edge without `maxIterations` can never fire more than the
    /// executor allows and is almost always a mistake.
    UnboundedSelfEdge { edge_key: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::HighRetryCount {
                node_id,
                max_attempts,
                recommended_max,
            } => {
                write!(
                    f,
                    "[W030] Node '{}' has maxAttempts={}. Consider {} or less to avoid long runs.",
                    node_id, max_attempts, recommended_max
                )
            }
            ValidationWarning::LongBackoff {
                node_id,
                backoff_ms,
                recommended_max_ms,
            } => {
                write!(
                    f,
                    "[W031] Node '{}' has backoff={}ms ({}). Consider {}ms or less.",
                    node_id,
                    backoff_ms,
                    format_duration(*backoff_ms),
                    recommended_max_ms
                )
            }
            ValidationWarning::LongTimeout {
                node_id,
                timeout_ms,
                recommended_max_ms,
            } => {
                write!(
                    f,
                    "[W032] Node '{}' has timeout={}ms ({}). Consider {} or less, or splitting the node.",
                    node_id,
                    timeout_ms,
                    format_duration(*timeout_ms),
                    format_duration(*recommended_max_ms)
                )
            }
            ValidationWarning::HighMaxIterations {
                edge_key,
                max_iterations,
                recommended_max,
            } => {
                write!(
                    f,
                    "[W033] Loop edge '{}' has maxIterations={}. Consider {} or less.",
                    edge_key, max_iterations, recommended_max
                )
            }
            ValidationWarning::UnreachableNode { node_id } => {
                write!(
                    f,
                    "[W040] Node '{}' is unreachable: all of its incoming edges originate from \
                     nodes it can never be scheduled after",
                    node_id
                )
            }
            ValidationWarning::UnboundedSelfEdge { edge_key } => {
                write!(
                    f,
                    "[W041] Self-edge '{}' has no maxIterations and will resolve at most once",
                    edge_key
                )
            }
        }
    }
}

// ============================================================================
// Main Validation Functions
// ============================================================================

/// Parse and validate a raw JSON document as a flow.
///
/// Parse failures return the serde message; documents that parse go through
/// [`validate_flow`], with all errors joined into one message.
pub fn validate_value(raw: &serde_json::Value) -> Result<FlowSpec, String> {
    let flow = trellis_dsl::parse_flow(raw)?;
    let result = validate_flow(&flow);
    if result.has_errors() {
        let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
        return Err(messages.join("\n"));
    }
    Ok(flow)
}

/// Validate a flow for structural correctness.
///
/// Returns a `ValidationResult` containing errors and warnings.
/// Compilation should fail if there are any errors.
pub fn validate_flow(flow: &FlowSpec) -> ValidationResult {
    let mut result = ValidationResult::default();

    // Phase 1: node identity
    validate_nodes(flow, &mut result);

    // Phase 2: edge endpoints
    validate_edges(flow, &mut result);

    // Phase 3: configuration lints
    validate_configuration(flow, &mut result);

    // Phase 4: reachability (warning only; gated flows can be intentionally
    // sparse, and cycles are legal)
    validate_reachability(flow, &mut result);

    if result.has_errors() {
        tracing::debug!(
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            flow = flow.name.as_deref().unwrap_or("<unnamed>"),
            "flow validation failed"
        );
    }

    result
}

// ============================================================================
// Phase 1: Node Identity
// ============================================================================

fn validate_nodes(flow: &FlowSpec, result: &mut ValidationResult) {
    if flow.nodes.is_empty() {
        result.errors.push(ValidationError::EmptyFlow);
        return;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &flow.nodes {
        if !is_valid_node_id(&node.id) {
            result.errors.push(ValidationError::InvalidNodeId {
                node_id: node.id.clone(),
            });
        }
        if !seen.insert(node.id.as_str()) {
            result.errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
        if node.node_type.is_empty() {
            result.errors.push(ValidationError::MissingNodeType {
                node_id: node.id.clone(),
            });
        }
    }
}

/// Node ids must match `^[A-Za-z_][A-Za-z0-9_]*$`.
fn is_valid_node_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Phase 2: Edge Endpoints
// ============================================================================

fn validate_edges(flow: &FlowSpec, result: &mut ValidationResult) {
    let node_ids: Vec<String> = flow.nodes.iter().map(|n| n.id.clone()).collect();
    let id_set: HashSet<&str> = node_ids.iter().map(|s| s.as_str()).collect();

    for edge in &flow.edges {
        for (endpoint, node_id) in [("source", &edge.from), ("target", &edge.to)] {
            if !id_set.contains(node_id.as_str()) {
                result.errors.push(ValidationError::DanglingEdgeEndpoint {
                    edge_key: edge.key(),
                    endpoint: endpoint.to_string(),
                    node_id: node_id.clone(),
                    available_nodes: node_ids.clone(),
                });
            }
        }

        if edge.max_iterations == Some(0) {
            result.errors.push(ValidationError::ZeroMaxIterations {
                edge_key: edge.key(),
            });
        }

        if edge.from == edge.to && !edge.is_loop() {
            result.warnings.push(ValidationWarning::UnboundedSelfEdge {
                edge_key: edge.key(),
            });
        }
    }
}

// ============================================================================
// Phase 3: Configuration Lints
// ============================================================================

fn validate_configuration(flow: &FlowSpec, result: &mut ValidationResult) {
    for node in &flow.nodes {
        if let Some(retry) = node.policy.as_ref().and_then(|p| p.retry.as_ref()) {
            if retry.max_attempts == 0 {
                result.errors.push(ValidationError::ZeroMaxAttempts {
                    node_id: node.id.clone(),
                });
            } else if retry.max_attempts > MAX_ATTEMPTS_RECOMMENDED {
                result.warnings.push(ValidationWarning::HighRetryCount {
                    node_id: node.id.clone(),
                    max_attempts: retry.max_attempts,
                    recommended_max: MAX_ATTEMPTS_RECOMMENDED,
                });
            }

            if retry.backoff_ms > MAX_BACKOFF_MS {
                result.warnings.push(ValidationWarning::LongBackoff {
                    node_id: node.id.clone(),
                    backoff_ms: retry.backoff_ms,
                    recommended_max_ms: MAX_BACKOFF_MS,
                });
            }
        }

        if let Some(timeout) = node.timeout_ms() {
            if timeout > MAX_TIMEOUT_MS {
                result.warnings.push(ValidationWarning::LongTimeout {
                    node_id: node.id.clone(),
                    timeout_ms: timeout,
                    recommended_max_ms: MAX_TIMEOUT_MS,
                });
            }
        }
    }

    for edge in &flow.edges {
        if let Some(max_iterations) = edge.max_iterations {
            if max_iterations > MAX_ITERATIONS_RECOMMENDED {
                result.warnings.push(ValidationWarning::HighMaxIterations {
                    edge_key: edge.key(),
                    max_iterations,
                    recommended_max: MAX_ITERATIONS_RECOMMENDED,
                });
            }
        }
    }
}

// ============================================================================
// Phase 4: Reachability
// ============================================================================

/// Warn about nodes that can never be scheduled: every node with at least one
/// non-loop incoming edge must be reachable from some root (a node with no
/// non-loop incoming edges).
fn validate_reachability(flow: &FlowSpec, result: &mut ValidationResult) {
    // Dangling endpoints are already errors; skip the walk if the graph is
    // not even well-formed.
    let id_set: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
    if flow
        .edges
        .iter()
        .any(|e| !id_set.contains(e.from.as_str()) || !id_set.contains(e.to.as_str()))
    {
        return;
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for edge in &flow.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        if !edge.is_loop() {
            has_incoming.insert(edge.to.as_str());
        }
    }

    // Roots: ready immediately under scheduler rules.
    let mut queue: Vec<&str> = flow
        .nodes
        .iter()
        .filter(|n| !has_incoming.contains(n.id.as_str()))
        .map(|n| n.id.as_str())
        .collect();

    let mut reachable: HashSet<&str> = HashSet::new();
    while let Some(node_id) = queue.pop() {
        if !reachable.insert(node_id) {
            continue;
        }
        if let Some(successors) = adjacency.get(node_id) {
            for successor in successors {
                if !reachable.contains(successor) {
                    queue.push(successor);
                }
            }
        }
    }

    for node in &flow.nodes {
        if !reachable.contains(node.id.as_str()) {
            result.warnings.push(ValidationWarning::UnreachableNode {
                node_id: node.id.clone(),
            });
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Find the most similar name using Levenshtein distance.
fn find_similar_name(target: &str, candidates: &[String]) -> Option<String> {
    let target_lower = target.to_lowercase();

    candidates
        .iter()
        .filter_map(|candidate| {
            let distance = levenshtein_distance(&target_lower, &candidate.to_lowercase());
            // Only suggest if the distance is reasonable relative to the name
            if distance <= target.len() / 2 + 2 {
                Some((candidate.clone(), distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, d)| *d)
        .map(|(name, _)| name)
}

/// Simple Levenshtein distance implementation.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            curr[j] = (prev[j] + 1).min((curr[j - 1] + 1).min(prev[j - 1] + cost));
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Format milliseconds as human-readable duration.
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        format!("{:.1}min", ms as f64 / 60_000.0)
    } else {
        format!("{:.1}h", ms as f64 / 3_600_000.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
