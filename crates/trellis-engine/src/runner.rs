// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner abstraction: the seam where node type keys become executable code.
//!
//! The engine never interprets a node's `type` itself; it looks the key up in
//! an injected [`NodeRegistry`]. Hosts register one [`NodeRunner`] per type,
//! optionally with input/output [`ValueSchema`]s applied around each run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Execution context handed to a runner for a single attempt.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Run this invocation belongs to
    pub run_id: Uuid,
    /// Node being executed
    pub node_id: String,
    /// Node type key that selected this runner
    pub node_type: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Opaque per-node configuration from the flow document, unresolved
    pub config: Option<Value>,
}

/// Executable behavior behind a node type.
///
/// Implementations receive fully resolved input bindings; any error (or
/// timeout) counts as one failed attempt against the node's retry policy.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Execute one attempt.
    async fn run(&self, ctx: &NodeContext, input: Value) -> anyhow::Result<Value>;
}

/// Validating transform applied to runner input or output.
///
/// `parse` may normalize the value (defaults, coercions) as well as reject
/// it; rejections surface as `SCHEMA_VALIDATION_ERROR` against the node.
#[derive(Clone)]
pub struct ValueSchema {
    parser: Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>,
}

impl ValueSchema {
    /// Schema from an arbitrary parse function.
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            parser: Arc::new(parse),
        }
    }

    /// Schema requiring an object with the given non-null fields present.
    pub fn object_with_required(fields: &[&str]) -> Self {
        let required: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        Self::new(move |value| {
            let map = value
                .as_object()
                .ok_or_else(|| format!("expected an object, got {}", type_name(&value)))?;
            for field in &required {
                match map.get(field) {
                    Some(v) if !v.is_null() => {}
                    _ => return Err(format!("missing required field '{}'", field)),
                }
            }
            Ok(value)
        })
    }

    /// Apply the schema.
    pub fn parse(&self, value: Value) -> Result<Value, String> {
        (self.parser)(value)
    }
}

impl std::fmt::Debug for ValueSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ValueSchema")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A registered node type: runner plus optional schemas.
pub struct RegistryEntry {
    runner: Arc<dyn NodeRunner>,
    input_schema: Option<ValueSchema>,
    output_schema: Option<ValueSchema>,
}

impl RegistryEntry {
    /// The runner for this type.
    pub fn runner(&self) -> &Arc<dyn NodeRunner> {
        &self.runner
    }

    /// Schema applied to resolved input before each run.
    pub fn input_schema(&self) -> Option<&ValueSchema> {
        self.input_schema.as_ref()
    }

    /// Schema applied to the runner's output on success.
    pub fn output_schema(&self) -> Option<&ValueSchema> {
        self.output_schema.as_ref()
    }
}

/// Node-type string -> runner mapping, injected into the executor.
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `constant` and `conditional`
    /// types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("constant", Arc::new(ConstantRunner));
        registry.register("conditional", Arc::new(PassthroughRunner));
        registry
    }

    /// Register a runner for a node type, replacing any previous entry.
    pub fn register(&mut self, node_type: impl Into<String>, runner: Arc<dyn NodeRunner>) {
        self.entries.insert(
            node_type.into(),
            RegistryEntry {
                runner,
                input_schema: None,
                output_schema: None,
            },
        );
    }

    /// Register a runner together with input/output schemas.
    pub fn register_with_schemas(
        &mut self,
        node_type: impl Into<String>,
        runner: Arc<dyn NodeRunner>,
        input_schema: Option<ValueSchema>,
        output_schema: Option<ValueSchema>,
    ) {
        self.entries.insert(
            node_type.into(),
            RegistryEntry {
                runner,
                input_schema,
                output_schema,
            },
        );
    }

    /// Look up the entry for a node type.
    pub fn get(&self, node_type: &str) -> Option<&RegistryEntry> {
        self.entries.get(node_type)
    }

    /// Registered type keys, sorted.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

// ============================================================================
// Built-in Runners
// ============================================================================

/// Emits the node's `config` value unchanged (`null` if absent).
pub struct ConstantRunner;

#[async_trait]
impl NodeRunner for ConstantRunner {
    async fn run(&self, ctx: &NodeContext, _input: Value) -> anyhow::Result<Value> {
        Ok(ctx.config.clone().unwrap_or(Value::Null))
    }
}

/// Emits its resolved input unchanged. Backs the `conditional` type, whose
/// actual routing happens on its outgoing edge conditions.
pub struct PassthroughRunner;

#[async_trait]
impl NodeRunner for PassthroughRunner {
    async fn run(&self, _ctx: &NodeContext, input: Value) -> anyhow::Result<Value> {
        Ok(input)
    }
}
