// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Condition expression types for `when` clauses on nodes and edges.
//!
//! A condition is either a structured AST (`equals`, `not`, `and`, `or`) or a
//! small expression-language string (e.g. `"nodes.review.approved == true"`).
//! Both forms deserialize from the same field; evaluation lives in
//! `trellis-engine`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A `when` condition: structured AST or expression string.
///
/// ```json
/// "nodes.review.approved"
/// ```
/// or
/// ```json
/// { "op": "equals", "left": { "ref": "nodes.review.verdict" }, "right": "approve" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConditionExpression {
    /// Structured condition AST
    Ast(ConditionAst),

    /// Expression-language string evaluated against the binding context
    Expr(String),
}

/// Structured condition AST, discriminated by the `op` field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ConditionAst {
    /// True when both operands resolve to equal JSON values
    Equals {
        /// Left operand
        left: Operand,
        /// Right operand
        right: Operand,
    },

    /// Logical negation
    Not {
        /// Operand to negate
        operand: Box<ConditionAst>,
    },

    /// True when every operand is true (true for an empty list)
    And {
        /// Conjunction operands
        operands: Vec<ConditionAst>,
    },

    /// True when at least one operand is true (false for an empty list)
    Or {
        /// Disjunction operands
        operands: Vec<ConditionAst>,
    },
}

/// An operand in a condition: a reference into the binding context or a
/// literal JSON value.
///
/// References are objects with a single `ref` field so that literal objects
/// remain expressible: `{ "ref": "nodes.review.verdict" }` vs `"approve"`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Operand {
    /// Reference to a dot-path in the binding context
    Reference {
        /// Dot-path, e.g. `"nodes.review.verdict"` or `"input.topic"`
        #[serde(rename = "ref")]
        path: String,
    },

    /// Literal JSON value
    Literal(serde_json::Value),
}
