//! Tool-call directives embedded in generated text.
//!
//! Models are instructed to wrap tool invocations in marker tags inside
//! their ordinary text output. This module hides that block from the
//! visible/spoken stream ([`filter`]) and recovers the structured payload
//! from the raw turn text once generation ends ([`extract`]).

pub mod extract;
pub mod filter;

/// Marker opening a directive block.
pub const OPEN_MARKER: &str = "<tool_call>";
/// Marker closing a directive block.
pub const CLOSE_MARKER: &str = "</tool_call>";
/// Marker pair wrapping tool results fed back to the engine.
pub const RESPONSE_OPEN: &str = "<tool_response>";
/// Closing half of the response marker pair.
pub const RESPONSE_CLOSE: &str = "</tool_response>";

/// A structured tool invocation recovered from generated text.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Tool name, validated non-empty.
    pub name: String,
    /// Tool arguments, always a JSON object.
    pub arguments: serde_json::Map<String, serde_json::Value>,
}
