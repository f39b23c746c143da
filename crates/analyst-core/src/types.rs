use analyst_sandbox::{RunnerErrorDetail, RunnerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Chat,
    Sql,
    Plan,
    Python,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Rejected,
    TimedOut,
}

/// Immutable record of one completed turn. Created exactly once, at the end
/// of every turn — including rejections and failures — and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCapsule {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub dataset_id: String,
    #[serde(default)]
    pub dataset_version_hash: Option<String>,
    pub question: String,
    pub query_mode: QueryMode,
    #[serde(default)]
    pub plan_json: Option<serde_json::Value>,
    #[serde(default)]
    pub compiled_sql: Option<String>,
    #[serde(default)]
    pub python_code: Option<String>,
    pub status: RunStatus,
    pub result_json: RunnerResult,
    #[serde(default)]
    pub error_json: Option<RunnerErrorDetail>,
    pub exec_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One persisted entry in a thread's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub dataset_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
