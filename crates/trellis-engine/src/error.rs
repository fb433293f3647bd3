// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine error taxonomy. Every variant carries a stable machine-readable
//! code and enough context to point at the offending node or binding.

use trellis_flows::CompileError;

/// Errors surfaced by the scheduler and executor.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The flow failed compilation (validation errors or gate conflicts).
    InvalidFlow {
        /// Underlying compile failure
        source: CompileError,
    },

    /// A node references a type with no registered runner.
    UnknownNodeType {
        /// Node whose type is unregistered
        node_id: String,
        /// The unregistered type key
        node_type: String,
    },

    /// Internal scheduling inconsistency.
    Scheduling {
        /// What went wrong
        message: String,
    },

    /// The run went quiescent with nodes still pending: an unbounded cycle.
    /// Bounded loops (edges with `maxIterations`) never produce this.
    CycleDetected {
        /// Nodes left pending when the run stalled
        node_ids: Vec<String>,
    },

    /// Runner input or output rejected by the registered schema.
    SchemaValidation {
        /// Node whose payload was rejected
        node_id: String,
        /// Schema's rejection message
        message: String,
    },

    /// A `{{ path }}` binding reference resolved to nothing.
    MissingBinding {
        /// Node whose input could not be resolved
        node_id: String,
        /// Input field carrying the reference
        field: String,
        /// The path that missed
        path: String,
    },

    /// A condition or template expression could not be evaluated.
    Expression {
        /// Where the expression appeared (node or edge)
        context: String,
        /// What was wrong with it
        message: String,
    },

    /// A node exhausted its attempts and the failure is fatal for the run.
    NodeFailed {
        /// The failed node
        node_id: String,
        /// Attempts consumed
        attempts: u32,
        /// Final attempt's error message
        message: String,
    },
}

impl EngineError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFlow { .. } => "INVALID_FLOW_DEFINITION",
            Self::UnknownNodeType { .. } | Self::Scheduling { .. } => "SCHEDULING_ERROR",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_ERROR",
            Self::MissingBinding { .. } => "MISSING_REQUIRED_FIELD",
            Self::Expression { .. } => "EXPRESSION_ERROR",
            Self::NodeFailed { .. } => "NODE_EXECUTION_FAILED",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFlow { source } => write!(f, "{}", source),
            Self::UnknownNodeType { node_id, node_type } => write!(
                f,
                "Node '{}' has type '{}' but no runner is registered for it",
                node_id, node_type
            ),
            Self::Scheduling { message } => write!(f, "Scheduling error: {}", message),
            Self::CycleDetected { node_ids } => write!(
                f,
                "Run stalled with pending nodes [{}]: cycle without a maxIterations bound",
                node_ids.join(", ")
            ),
            Self::SchemaValidation { node_id, message } => {
                write!(f, "Schema validation failed for node '{}': {}", node_id, message)
            }
            Self::MissingBinding {
                node_id,
                field,
                path,
            } => write!(
                f,
                "Input '{}' of node '{}' references '{}' which resolved to nothing",
                field, node_id, path
            ),
            Self::Expression { context, message } => {
                write!(f, "Expression error in {}: {}", context, message)
            }
            Self::NodeFailed {
                node_id,
                attempts,
                message,
            } => write!(
                f,
                "Node '{}' failed after {} attempt(s): {}",
                node_id, attempts, message
            ),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidFlow { source } => Some(source),
            _ => None,
        }
    }
}

impl From<CompileError> for EngineError {
    fn from(source: CompileError) -> Self {
        Self::InvalidFlow { source }
    }
}
