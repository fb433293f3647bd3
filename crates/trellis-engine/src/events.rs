// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle events. The executor emits these to an injected sink; hosts
//! plug in their own sink to feed UIs or signal buses.

use uuid::Uuid;

use crate::state::EdgeStatus;

/// Something observable that happened during a run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FlowEvent {
    /// A run began.
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Flow name, if the document carried one
        flow_name: Option<String>,
    },

    /// A runner attempt began.
    NodeStarted {
        /// Node being executed
        node_id: String,
        /// 1-based attempt number
        attempt: u32,
    },

    /// A node settled with a value.
    NodeCompleted {
        /// The settled node
        node_id: String,
    },

    /// A node exhausted its attempts.
    NodeFailed {
        /// The failed node
        node_id: String,
        /// Attempts consumed
        attempts: u32,
        /// Final attempt's error message
        message: String,
    },

    /// A node settled without running.
    NodeSkipped {
        /// The skipped node
        node_id: String,
        /// `"when"` or `"edge"`
        reason: &'static str,
    },

    /// An edge resolved (fired or skipped).
    EdgeResolved {
        /// Edge key
        edge_key: String,
        /// Resolution
        status: EdgeStatus,
    },

    /// A loop edge fired another iteration.
    LoopIteration {
        /// The loop edge's key
        edge_key: String,
        /// Firings so far, including this one
        iteration: u32,
    },

    /// The run went quiescent.
    RunCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Wall-clock duration
        duration_ms: u64,
    },
}

/// Receiver for [`FlowEvent`]s. Must be cheap; the executor calls it inline.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &FlowEvent);
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &FlowEvent) {}
}

/// Forwards events as structured `tracing` records.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &FlowEvent) {
        match event {
            FlowEvent::RunStarted { run_id, flow_name } => {
                tracing::info!(
                    %run_id,
                    flow = flow_name.as_deref().unwrap_or("<unnamed>"),
                    "run started"
                );
            }
            FlowEvent::NodeStarted { node_id, attempt } => {
                tracing::debug!(%node_id, attempt = *attempt, "node started");
            }
            FlowEvent::NodeCompleted { node_id } => {
                tracing::info!(%node_id, "node completed");
            }
            FlowEvent::NodeFailed {
                node_id,
                attempts,
                message,
            } => {
                tracing::warn!(%node_id, attempts = *attempts, %message, "node failed");
            }
            FlowEvent::NodeSkipped { node_id, reason } => {
                tracing::debug!(%node_id, reason, "node skipped");
            }
            FlowEvent::EdgeResolved { edge_key, status } => {
                tracing::debug!(%edge_key, %status, "edge resolved");
            }
            FlowEvent::LoopIteration {
                edge_key,
                iteration,
            } => {
                tracing::debug!(%edge_key, iteration = *iteration, "loop iteration");
            }
            FlowEvent::RunCompleted {
                run_id,
                duration_ms,
            } => {
                tracing::info!(%run_id, duration_ms = *duration_ms, "run completed");
            }
        }
    }
}
