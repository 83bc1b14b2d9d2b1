//! Tool trait and registry — the abstraction over assistant capabilities.
//!
//! Tools are what give the assistant the ability to act on the machine:
//! read and write files, launch applications, search the web, report system
//! metrics. The engine never sees a raw handler error: `dispatch` converts
//! unknown names, argument-validation failures, and handler failures into
//! structured [`ToolOutcome`]s so the model can react conversationally.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// What a handler produces on a completed execution.
///
/// `success: false` is for domain-level failures the handler itself observed
/// (file not found, command exited nonzero); infrastructure failures are
/// returned as `Err(ToolError)` instead. Both end up as a failure outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// The recorded result of one tool invocation.
///
/// Exactly one outcome is produced per requested call, success or failure —
/// a failed call is never silently dropped, so the model always gets a
/// result message to react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The call ID this outcome answers
    pub call_id: String,

    /// The tool that was (or would have been) invoked
    pub tool_name: String,

    /// The arguments as received
    pub arguments: serde_json::Value,

    /// Whether execution succeeded
    pub success: bool,

    /// Result payload on success, error message on failure
    pub output: String,
}

impl ToolOutcome {
    fn failure(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            success: false,
            output: output.into(),
        }
    }
}

/// The core Tool trait.
///
/// Each tool (file_read, launch_app, web_search, etc.) implements this
/// trait. Tools are registered in the [`ToolRegistry`] and offered to the
/// language model as [`ToolDefinition`]s.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Effectively immutable once startup (built-ins + plugin discovery) is
/// done; the engine only reads it.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Rejects duplicate names.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register_override(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        // Stable ordering keeps prompts (and tests) deterministic
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call, converting every failure mode into a structured
    /// outcome. This never returns an error: unknown tools, invalid
    /// arguments, and handler failures all come back as `success: false`
    /// outcomes the model can read.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested unknown tool");
            return ToolOutcome::failure(call, format!("unknown tool: {}", call.name));
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolOutcome::failure(call, format!("invalid arguments: {reason}"));
        }

        match tool.execute(call.arguments.clone()).await {
            Ok(out) => ToolOutcome {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                success: out.success,
                output: out.output,
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutcome::failure(call, e.to_string())
            }
        }
    }
}

/// Best-effort structural validation of arguments against a JSON Schema:
/// required keys must be present, and declared property types must match at
/// the JSON level. Anything the schema doesn't say is allowed through.
pub fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), String> {
    let Some(args) = arguments.as_object() else {
        // Tools with no parameters accept null/missing argument objects
        if schema
            .get("required")
            .and_then(|r| r.as_array())
            .is_some_and(|r| !r.is_empty())
        {
            return Err("expected an argument object".into());
        }
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in args {
            let Some(expected) = props.get(key).and_then(|p| p.get("type")).and_then(|t| t.as_str())
            else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(format!("argument '{key}' should be of type {expected}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutput, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolOutput::ok(text))
        }
    }

    /// A tool whose handler always errors.
    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "handler blew up".into(),
            })
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "echo"));
    }

    #[test]
    fn register_override_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register_override(Box::new(EchoTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(BrokenTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "broken");
        assert_eq!(defs[1].name, "echo");
    }

    #[tokio::test]
    async fn dispatch_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let outcome = registry.dispatch(&call("echo", json!({"text": "hello"}))).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hello");
        assert_eq!(outcome.call_id, "call_1");
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_failure_outcome() {
        let registry = ToolRegistry::new();
        let outcome = registry.dispatch(&call("delete_universe", json!({}))).await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("unknown tool"));
        assert_eq!(outcome.tool_name, "delete_universe");
    }

    #[tokio::test]
    async fn dispatch_missing_required_argument() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let outcome = registry.dispatch(&call("echo", json!({}))).await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("missing required argument"));
    }

    #[tokio::test]
    async fn dispatch_wrong_argument_type() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();

        let outcome = registry.dispatch(&call("echo", json!({"text": 42}))).await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("type string"));
    }

    #[tokio::test]
    async fn dispatch_handler_error_becomes_outcome() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(BrokenTool)).unwrap();

        let outcome = registry.dispatch(&call("broken", json!({}))).await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("handler blew up"));
    }

    #[test]
    fn validate_allows_extra_undeclared_arguments() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        assert!(validate_arguments(&schema, &json!({"a": "x", "b": 1})).is_ok());
    }

    #[test]
    fn validate_null_arguments_for_parameterless_tool() {
        let schema = json!({"type": "object", "properties": {}, "required": []});
        assert!(validate_arguments(&schema, &serde_json::Value::Null).is_ok());
    }

    #[test]
    fn validate_integer_accepts_int_rejects_float() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        assert!(validate_arguments(&schema, &json!({"n": 3})).is_ok());
        assert!(validate_arguments(&schema, &json!({"n": 3.5})).is_err());
    }
}
