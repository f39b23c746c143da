use analyst_tools::ToolCall;

/// Events emitted while a turn executes. The streaming orchestrator adapts
/// these into the wire-level SSE event types; the non-streaming path simply
/// drains them and keeps only the final text.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TextDelta(String),
    TextComplete(String),
    ToolCallStarted(ToolCall),
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    TurnComplete,
    Error(String),
}
