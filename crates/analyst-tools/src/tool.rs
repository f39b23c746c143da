use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// The result of executing a tool. Every tool here always returns a
/// JSON-serializable envelope as plain text — there is no image/vision
/// output path in this system.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }

    /// Serializes `value` as the tool's content, for tools whose contract
    /// is "always return a JSON-serializable object."
    pub fn json(call_id: impl Into<String>, value: &impl serde::Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(text) => Self::ok(call_id, text),
            Err(e) => Self::err(call_id, format!("failed to serialize tool output: {e}")),
        }
    }
}

/// Trait every tool in the surface implements. Every tool here is always
/// available and always auto-approved — there is no human-in-the-loop
/// approval concept in this system.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}
