// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input binding resolution.
//!
//! Node inputs are JSON values whose strings may carry `{{ path }}`
//! references into the binding context (`input.*`, `nodes.<id>.*`). A string
//! that is exactly one reference resolves to the referenced value with its
//! type preserved; references embedded in a larger string interpolate as
//! text. Missing paths are hard errors so typos never silently become the
//! literal template text.

use serde_json::Value;
use trellis_dsl::NodeSpec;

use crate::error::EngineError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Resolves a node's declared input map against the binding context.
pub trait BindingResolver: Send + Sync {
    /// Produce the runner input for one node.
    fn resolve(&self, node: &NodeSpec, context: &Value) -> Result<Value, EngineError>;
}

/// Default resolver implementing `{{ path }}` template references.
#[derive(Debug, Default)]
pub struct TemplateResolver;

impl BindingResolver for TemplateResolver {
    fn resolve(&self, node: &NodeSpec, context: &Value) -> Result<Value, EngineError> {
        let mut resolved = serde_json::Map::with_capacity(node.input.len());
        for (field, value) in &node.input {
            resolved.insert(
                field.clone(),
                resolve_value(value, context, &node.id, field)?,
            );
        }
        Ok(Value::Object(resolved))
    }
}

fn resolve_value(
    value: &Value,
    context: &Value,
    node_id: &str,
    field: &str,
) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => resolve_string(s, context, node_id, field),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, context, node_id, field))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, context, node_id, field)?)))
            .collect::<Result<serde_json::Map<_, _>, EngineError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    s: &str,
    context: &Value,
    node_id: &str,
    field: &str,
) -> Result<Value, EngineError> {
    if !s.contains(OPEN) {
        return Ok(Value::String(s.to_string()));
    }

    // Whole-string reference: resolve to the referenced value, type intact.
    let trimmed = s.trim();
    if trimmed.starts_with(OPEN) && trimmed.ends_with(CLOSE) {
        let inner = trimmed[OPEN.len()..trimmed.len() - CLOSE.len()].trim();
        if !inner.is_empty() && !inner.contains(OPEN) && !inner.contains(CLOSE) {
            return lookup_path(context, inner)
                .cloned()
                .ok_or_else(|| missing(node_id, field, inner));
        }
    }

    // Mixed content: interpolate each reference as text.
    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after.find(CLOSE).ok_or_else(|| EngineError::Expression {
            context: format!("input '{}' of node '{}'", field, node_id),
            message: format!("unterminated '{{{{' in \"{}\"", s),
        })?;
        let path = after[..end].trim();
        let value = lookup_path(context, path).ok_or_else(|| missing(node_id, field, path))?;
        out.push_str(&render_text(value));
        rest = &after[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn missing(node_id: &str, field: &str, path: &str) -> EngineError {
    EngineError::MissingBinding {
        node_id: node_id.to_string(),
        field: field.to_string(),
        path: path.to_string(),
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dot-separated path through objects (by key) and arrays (by index).
pub fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
