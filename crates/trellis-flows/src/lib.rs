// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trellis Flows - Flow Validation and Graph Compilation
//!
//! This crate turns a declarative [`FlowSpec`](trellis_dsl::FlowSpec) into a
//! [`CompiledFlow`](compile::CompiledFlow): nodes and edges in stable order
//! plus the derived indices the scheduler needs (outgoing adjacency,
//! incoming-edge lists, per-node gate rule).
//!
//! # Pipeline
//!
//! ```text
//!     ┌─────────────┐      ┌─────────────┐      ┌──────────────┐
//!     │  Flow JSON  │─────▶│  Validator  │─────▶│ CompiledFlow │
//!     │             │      │ (itemized)  │      │  (immutable) │
//!     └─────────────┘      └─────────────┘      └──────────────┘
//! ```
//!
//! 1. **Parse**: deserialize the flow document (`trellis-dsl`)
//! 2. **Validate**: structural rules, reported as an itemized list of
//!    errors and warnings - a single pass surfaces every problem
//! 3. **Compile**: O(N+E) index construction with gate-conflict detection
//!
//! # Important Notes
//!
//! - Compilation performs **no cycle detection**. Cycles are a supported
//!   control-flow primitive (bounded loops via `maxIterations` edges); loop
//!   termination is the executor's responsibility.
//! - A `CompiledFlow` carries no per-run state and is safe to reuse across
//!   many concurrent runs.

#![deny(missing_docs)]

/// Graph compilation into a reusable [`compile::CompiledFlow`].
pub mod compile;

/// Structural flow validation with itemized errors and warnings.
pub mod validation;

pub use compile::{CompileError, CompiledFlow, compile};
pub use validation::{ValidationError, ValidationResult, ValidationWarning, validate_flow};
