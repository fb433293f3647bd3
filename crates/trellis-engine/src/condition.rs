// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Condition evaluation for node and edge `when` clauses.
//!
//! Two forms share one entry point: the structured AST
//! (`equals`/`not`/`and`/`or` over references and literals) and a small
//! expression string form (`path`, `!path`, `lhs == rhs`, `lhs != rhs`,
//! joined with `&&` and `||`; `&&` binds tighter). References that resolve to
//! nothing evaluate as `null` rather than erroring, so conditions can probe
//! outputs that may not exist.

use serde_json::Value;
use trellis_dsl::{ConditionAst, ConditionExpression, Operand};

use crate::error::EngineError;
use crate::resolve::lookup_path;

/// Evaluates `when` conditions against the binding context.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate a condition; `context` is the run's binding context.
    fn evaluate(&self, condition: &ConditionExpression, context: &Value)
    -> Result<bool, EngineError>;
}

/// Built-in evaluator for both condition forms.
#[derive(Debug, Default)]
pub struct DefaultConditionEvaluator;

impl ConditionEvaluator for DefaultConditionEvaluator {
    fn evaluate(
        &self,
        condition: &ConditionExpression,
        context: &Value,
    ) -> Result<bool, EngineError> {
        match condition {
            ConditionExpression::Ast(ast) => Ok(eval_ast(ast, context)),
            ConditionExpression::Expr(expr) => {
                eval_expr(expr, context).map_err(|e| EngineError::Expression {
                    context: format!("\"{}\"", expr),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Shape errors in the expression string form.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    /// The whole expression was empty
    #[error("empty expression")]
    Empty,

    /// A `&&`/`||`/comparison operand was empty
    #[error("empty operand near '{0}'")]
    EmptyOperand(String),
}

// ============================================================================
// AST form
// ============================================================================

fn eval_ast(ast: &ConditionAst, context: &Value) -> bool {
    match ast {
        ConditionAst::Equals { left, right } => json_eq(
            &resolve_operand(left, context),
            &resolve_operand(right, context),
        ),
        ConditionAst::Not { operand } => !eval_ast(operand, context),
        ConditionAst::And { operands } => operands.iter().all(|op| eval_ast(op, context)),
        ConditionAst::Or { operands } => operands.iter().any(|op| eval_ast(op, context)),
    }
}

fn resolve_operand(operand: &Operand, context: &Value) -> Value {
    match operand {
        Operand::Reference { path } => lookup_path(context, path).cloned().unwrap_or(Value::Null),
        Operand::Literal(value) => value.clone(),
    }
}

// ============================================================================
// Expression string form
// ============================================================================

fn eval_expr(expr: &str, context: &Value) -> Result<bool, ExpressionError> {
    if expr.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    for clause in expr.split("||") {
        if eval_conjunction(clause, context)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn eval_conjunction(clause: &str, context: &Value) -> Result<bool, ExpressionError> {
    for term in clause.split("&&") {
        if !eval_term(term, context)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_term(term: &str, context: &Value) -> Result<bool, ExpressionError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ExpressionError::EmptyOperand(term.to_string()));
    }
    if let Some(idx) = term.find("==") {
        let left = parse_operand(&term[..idx], term, context)?;
        let right = parse_operand(&term[idx + 2..], term, context)?;
        return Ok(json_eq(&left, &right));
    }
    if let Some(idx) = term.find("!=") {
        let left = parse_operand(&term[..idx], term, context)?;
        let right = parse_operand(&term[idx + 2..], term, context)?;
        return Ok(!json_eq(&left, &right));
    }
    if let Some(rest) = term.strip_prefix('!') {
        return Ok(!eval_term(rest, context)?);
    }
    Ok(truthy(&parse_operand(term, term, context)?))
}

fn parse_operand(raw: &str, term: &str, context: &Value) -> Result<Value, ExpressionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExpressionError::EmptyOperand(term.to_string()));
    }
    // JSON literal first (true/false/null, numbers, quoted strings), then a
    // path into the binding context; a missing path reads as null.
    if let Ok(literal) = serde_json::from_str::<Value>(raw) {
        return Ok(literal);
    }
    Ok(lookup_path(context, raw).cloned().unwrap_or(Value::Null))
}

// Numbers compare by value so `1 == 1.0` holds across serde_json's integer
// and float representations.
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(lf), Some(rf)) => lf == rf,
            _ => l == r,
        },
        _ => left == right,
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]`, and `{}` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
