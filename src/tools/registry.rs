//! Tool lookup and directive execution.

use super::Tool;
use super::clock::ClockTool;
use super::math::MathTool;
use crate::directive::{Directive, RESPONSE_CLOSE, RESPONSE_OPEN};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Results longer than this are acknowledged with a canned phrase
/// instead of being read out loud.
const SPOKEN_RESULT_MAX: usize = 200;

/// Outcome of a directive execution, in the shape the model is
/// instructed to expect inside a response block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// Result rendered for display, without JSON quoting for plain strings.
    pub fn result_text(&self) -> String {
        match &self.result {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Short acknowledgement for the speech queue.
    pub fn spoken_ack(&self) -> String {
        if !self.ok {
            return "There was an error executing the tool.".to_owned();
        }
        let text = self.result_text();
        if text.chars().count() < SPOKEN_RESULT_MAX {
            format!("The result is {text}")
        } else {
            "I have calculated the result.".to_owned()
        }
    }

    /// The outcome serialized and wrapped for the model's context.
    pub fn feedback_block(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"error":"unserializable tool outcome"}"#.to_owned()
        });
        format!("{RESPONSE_OPEN}{json}{RESPONSE_CLOSE}")
    }
}

/// Fixed set of tools exposed to the model for a session.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn with_builtins() -> Self {
        Self {
            tools: vec![Box::new(MathTool), Box::new(ClockTool)],
        }
    }

    /// Registry with no tools; directives are rejected as unknown.
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Function descriptors for the system prompt's tools block.
    pub fn descriptors(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.input_schema(),
                    }
                })
            })
            .collect()
    }

    /// Run the tool a directive names. Never fails; unknown tools and
    /// execution errors come back as failed outcomes for the model to see.
    pub fn execute_directive(&self, directive: &Directive) -> ToolOutcome {
        info!("tool call: {}", directive.name);
        debug!(
            arguments = %Value::Object(directive.arguments.clone()),
            "tool call arguments"
        );

        let Some(tool) = self.get(&directive.name) else {
            let mut available = self.names();
            available.sort_unstable();
            let message = format!(
                "unknown tool '{}', available: {}",
                directive.name,
                available.join(", ")
            );
            warn!("{message}");
            return ToolOutcome::failure(message);
        };

        match tool.execute(&directive.arguments) {
            Ok(result) => ToolOutcome::success(result),
            Err(e) => {
                warn!("tool '{}' failed: {e}", directive.name);
                ToolOutcome::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    fn directive(name: &str, args: Value) -> Directive {
        let arguments = match args {
            Value::Object(map) => map,
            other => panic!("test arguments must be an object, got {other}"),
        };
        Directive {
            name: name.to_owned(),
            arguments,
        }
    }

    #[test]
    fn builtins_include_math_and_clock() {
        let registry = ToolRegistry::with_builtins();
        let names = registry.names();
        assert!(names.contains(&"math"));
        assert!(names.contains(&"clock"));
        assert!(registry.get("math").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn descriptors_use_function_format() {
        let registry = ToolRegistry::with_builtins();
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 2);
        for d in &descriptors {
            assert_eq!(d["type"], "function");
            assert!(d["function"]["name"].is_string());
            assert!(d["function"]["parameters"].is_object());
        }
    }

    #[test]
    fn math_directive_round_trip() {
        let registry = ToolRegistry::with_builtins();
        let outcome =
            registry.execute_directive(&directive("math", json!({"op": "mul", "numbers": [6, 7]})));
        assert!(outcome.ok);
        assert_eq!(outcome.result, Some(json!(42.0)));
        assert_eq!(outcome.spoken_ack(), "The result is 42.0");
        assert_eq!(
            outcome.feedback_block(),
            r#"<tool_response>{"ok":true,"result":42.0}</tool_response>"#
        );
    }

    #[test]
    fn unknown_tool_reports_available_names() {
        let registry = ToolRegistry::with_builtins();
        let outcome = registry.execute_directive(&directive("weather", json!({})));
        assert!(!outcome.ok);
        let error = match &outcome.error {
            Some(e) => e,
            None => panic!("expected an error message"),
        };
        assert!(error.contains("weather"));
        assert!(error.contains("clock, math"));
        assert_eq!(
            outcome.spoken_ack(),
            "There was an error executing the tool."
        );
    }

    #[test]
    fn execution_error_becomes_failed_outcome() {
        let registry = ToolRegistry::with_builtins();
        let outcome = registry
            .execute_directive(&directive("math", json!({"op": "div", "numbers": [1, 0]})));
        assert!(!outcome.ok);
        assert!(outcome.feedback_block().contains(r#""ok":false"#));
    }

    #[test]
    fn long_results_get_the_canned_ack() {
        let outcome = ToolOutcome::success(Value::from("x".repeat(300)));
        assert_eq!(outcome.spoken_ack(), "I have calculated the result.");
    }

    #[test]
    fn string_results_are_spoken_unquoted() {
        let outcome = ToolOutcome::success(Value::from("Friday 22 August 2025, 10:30"));
        assert_eq!(
            outcome.spoken_ack(),
            "The result is Friday 22 August 2025, 10:30"
        );
    }
}
