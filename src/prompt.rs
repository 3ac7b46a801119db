//! System prompt assembly.
//!
//! The prompt teaches the model how to request tools: descriptors go in a
//! `<tools>` block, calls come back in `<tool_call>` blocks, and results
//! are delivered in `<tool_response>` blocks. The wording is deliberately
//! repetitive; small instruction-tuned models need the reinforcement.

use crate::tools::ToolRegistry;

/// Conversational prompt used when no tools are exposed.
const ASSISTANT_PREAMBLE: &str = "You are a helpful voice assistant. \
    Keep answers short and conversational, with no markup or lists; \
    everything you write will be read aloud.";

/// Build the system prompt for a session with the given tools.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return ASSISTANT_PREAMBLE.to_owned();
    }

    let tools_json =
        serde_json::to_string(&registry.descriptors()).unwrap_or_else(|_| "[]".to_owned());
    let names_list = registry
        .names()
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a helpful assistant.

# Available Tools
<tools>
{tools_json}
</tools>

Available tools: {names_list}

# Your Role vs Tool Role
- YOU are the ASSISTANT - you CALL tools, you do NOT respond as tools
- YOU output <tool_call> tags to REQUEST tool execution
- The SYSTEM executes the tool and sends you <tool_response> tags
- YOU then respond to the user based on the tool result
- NEVER output <tool_response> tags yourself - that's what the system sends TO you

# Tool Usage Rules
- DEFAULT: If a tool can handle the request, CALL IT using <tool_call>
- ONLY these tools exist: {names_list}. NEVER invent or call tools with different names
- Skip tools ONLY for greetings, small talk, or requests with no tool match

# How to Call a Tool
When you need to use a tool, output ONLY this format:
<tool_call>
{{"name": "<function-name>", "arguments": <args-json-object>}}
</tool_call>

Rules:
- Use double quotes (") in JSON, not single quotes
- Arguments must be a JSON object, not a string
- Use only these tool names: {names_list}
- After calling, wait for the system to send you <tool_response>

# Responding to Tool Results
When you receive a <tool_response>, answer the user with a concise, natural
message based on the ACTUAL result data. Do not thank the tool, do not repeat
technical details, and do not invent values that are not in the JSON.

Example: if the tool returns {{"ok": true, "result": 2}}, answer "The result is 2."
"#
    )
}
