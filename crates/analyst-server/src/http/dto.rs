use analyst_core::{QueryMode, RunStatus};
use analyst_sandbox::RunnerErrorDetail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub dataset_id: String,
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Direct-execute variant of `/chat`: skips the fast-path prefix
/// convention and names the query type explicitly, mirroring the original
/// run-submission endpoint this one supersedes.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSubmitRequest {
    pub dataset_id: String,
    pub query_type: RunQueryType,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub python_code: Option<String>,
    #[serde(default)]
    pub plan_json: Option<Value>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunQueryType {
    Sql,
    Python,
    Plan,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultDto {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: u64,
    pub exec_time_ms: u64,
    pub error: Option<RunnerErrorDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Details {
    pub dataset_id: String,
    pub query_mode: QueryMode,
    pub plan_json: Option<Value>,
    pub compiled_sql: Option<String>,
    pub python_code: Option<String>,
}

/// Uniform response for `/chat`, `/chat/stream`'s final `result` event, and
/// `/runs`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub assistant_message: String,
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub result: ResultDto,
    pub details: Details,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status { stage: String },
    Token { text: String },
    ToolCall { name: String, args: Value },
    ToolResult { name: String, is_error: bool },
    Result { response: ChatResponse },
    Error { error_type: String, message: String },
    Done { run_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatusDto {
    pub run_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
