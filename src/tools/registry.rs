//! Tool registry: stores handlers by name and dispatches invocations,
//! coercing loosely-typed arguments against each handler's JSON Schema
//! first (models sometimes pass `"true"` for a boolean or `"3"` for an
//! integer).

use super::base::{ToolHandler, ToolInvocation, ToolOutput};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn coerce_arguments(arguments: &Value, schema: &Value) -> Value {
    let Some(args) = arguments.as_object() else {
        return arguments.clone();
    };
    let properties = schema.get("properties").and_then(|p| p.as_object());
    let mut coerced = args.clone();

    for (key, value) in args.iter() {
        if value.is_null() {
            continue;
        }
        let Some(props) = properties else { continue };
        let Some(prop_schema) = props.get(key) else {
            continue;
        };
        let expected_type = prop_schema.get("type").and_then(|t| t.as_str());

        match expected_type {
            Some("boolean") if !value.is_boolean() => {
                let coerced_bool = match value {
                    Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
                    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                    _ => false,
                };
                coerced.insert(key.clone(), Value::Bool(coerced_bool));
            }
            Some("integer") if !value.is_i64() && !value.is_u64() => {
                if let Some(parsed) = value_to_i64(value) {
                    coerced.insert(key.clone(), Value::from(parsed));
                }
            }
            Some("number") if !value.is_number() => {
                if let Value::String(s) = value {
                    if let Ok(f) = s.parse::<f64>() {
                        if let Some(num) = serde_json::Number::from_f64(f) {
                            coerced.insert(key.clone(), Value::Number(num));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Value::Object(coerced)
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Stores tool handlers by name and dispatches invocations to them.
///
/// Preserves registration order (not `HashMap` iteration order) so
/// `get_specs()` hands the model its tools in the same order they were
/// registered, matching the handler enumeration the profile built.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers a handler, keyed by its `name()`. Later registration with
    /// the same name overrides the handler in place, keeping its original
    /// position in registration order.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        if !self.handlers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.handlers.insert(name, handler);
    }

    /// Looks up a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    /// Returns every registered handler's OpenAI function-calling spec, in
    /// registration order.
    pub fn get_specs(&self) -> Vec<Value> {
        self.order.iter().filter_map(|name| self.handlers.get(name)).map(|h| h.to_spec()).collect()
    }

    /// Whether a tool requires approval before execution. Unknown tools are
    /// treated as requiring approval (fail safe, not fail open).
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.handlers
            .get(tool_name)
            .map(|h| h.requires_approval())
            .unwrap_or(true)
    }

    /// Dispatches an invocation to its handler. Unknown tools and handler
    /// panics-as-errors are reported as a failed [`ToolOutput`] rather than
    /// propagated, so the agent loop can keep running and let the model
    /// self-correct.
    pub async fn dispatch(&self, invocation: ToolInvocation) -> ToolOutput {
        let Some(handler) = self.handlers.get(&invocation.tool_name) else {
            return ToolOutput::error(format!("Unknown tool: {}", invocation.tool_name));
        };

        let coerced_args = coerce_arguments(&invocation.arguments, &handler.parameters());
        let coerced_invocation = ToolInvocation {
            call_id: invocation.call_id,
            tool_name: invocation.tool_name,
            arguments: coerced_args,
        };

        handler.handle(coerced_invocation).await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct AddHandler;

    #[async_trait]
    impl ToolHandler for AddHandler {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "Adds two integers"
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"},
                    "verbose": {"type": "boolean"}
                }
            })
        }
        async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
            let a = invocation.arguments["a"].as_i64().unwrap_or(0);
            let b = invocation.arguments["b"].as_i64().unwrap_or(0);
            ToolOutput::ok((a + b).to_string())
        }
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "nope".to_string(),
            arguments: json!({}),
        };
        let out = registry.dispatch(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_dispatch_coerces_string_integers() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(AddHandler));
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "add".to_string(),
            arguments: json!({"a": "3", "b": "4"}),
        };
        let out = registry.dispatch(invocation).await;
        assert!(out.success);
        assert_eq!(out.content, "7");
    }

    #[test]
    fn test_coerce_boolean_from_string() {
        let schema = json!({"properties": {"flag": {"type": "boolean"}}});
        let coerced = coerce_arguments(&json!({"flag": "true"}), &schema);
        assert_eq!(coerced["flag"], true);
    }

    #[test]
    fn test_requires_approval_unknown_tool_defaults_true() {
        let registry = ToolRegistry::new();
        assert!(registry.requires_approval("nonexistent"));
    }

    #[test]
    fn test_registry_len_and_contains() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(AddHandler));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("add"));
    }

    struct NamedHandler(&'static str);

    #[async_trait]
    impl ToolHandler for NamedHandler {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn handle(&self, _invocation: ToolInvocation) -> ToolOutput {
            ToolOutput::ok(String::new())
        }
    }

    #[test]
    fn test_get_specs_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["read", "glob", "grep", "bash"] {
            registry.register(Arc::new(NamedHandler(name)));
        }
        let names: Vec<String> =
            registry.get_specs().iter().map(|spec| spec["function"]["name"].as_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["read", "glob", "grep", "bash"]);
    }

    #[test]
    fn test_register_override_keeps_original_position() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedHandler("a")));
        registry.register(Arc::new(NamedHandler("b")));
        registry.register(Arc::new(NamedHandler("a")));
        let names: Vec<String> =
            registry.get_specs().iter().map(|spec| spec["function"]["name"].as_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }
}
