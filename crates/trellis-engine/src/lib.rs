// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trellis Engine - Flow Scheduling and Execution
//!
//! Takes a [`CompiledFlow`](trellis_flows::CompiledFlow) and drives it to
//! quiescence: readiness scheduling over AND/OR gates, conditional edges,
//! bounded loops (`maxIterations`), per-node retry/timeout policies, and
//! fail-fast vs continue-on-error failure handling.
//!
//! # Architecture
//!
//! ```text
//!     ┌──────────────┐   ready    ┌──────────────┐   run()    ┌────────────┐
//!     │  Scheduler   │───────────▶│   Executor   │───────────▶│ NodeRunner │
//!     │ (pure query) │            │ (gates, when,│            │ (registry) │
//!     └──────────────┘            │  retries)    │            └────────────┘
//!            ▲                    └──────┬───────┘
//!            │                           │ settle + edge resolution
//!            └────────── RunState ◀──────┘
//! ```
//!
//! Collaborators are injected through [`FlowExecutor::builder`]: the
//! [`NodeRegistry`] mapping node type keys to runners, a [`BindingResolver`]
//! for `{{ path }}` input references, a [`ConditionEvaluator`] for `when`
//! clauses, and an [`EventSink`] for run lifecycle events. Defaults cover
//! everything but the registry.
//!
//! Skips and failures are data, not exceptions: a node that settles without
//! running stores `{"skipped":true}` (false `when`) or
//! `{"skipped":true,"reason":"edge"}` (unsatisfied gate), and an exhausted
//! node stores `{"failed":true,"error":{...},"attempts":n}`. Downstream
//! conditions can inspect these markers like any other output.

pub mod condition;
pub mod error;
pub mod events;
pub mod executor;
pub mod resolve;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use condition::{ConditionEvaluator, DefaultConditionEvaluator};
pub use error::EngineError;
pub use events::{EventSink, FlowEvent, NoopSink, TracingSink};
pub use executor::{FlowExecutor, FlowExecutorBuilder, RunReport};
pub use resolve::{BindingResolver, TemplateResolver, lookup_path};
pub use runner::{
    ConstantRunner, NodeContext, NodeRegistry, NodeRunner, PassthroughRunner, RegistryEntry,
    ValueSchema,
};
pub use scheduler::next_ready_nodes;
pub use state::{EdgeStatus, NodeOutput, NodeStatus, RunState};
