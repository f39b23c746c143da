use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Sql,
    Python,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerFile {
    pub name: String,
    pub path: String,
}

/// The sandbox wire format, unchanged across all three providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerPayload {
    pub dataset_id: String,
    pub files: Vec<RunnerFile>,
    pub query_type: QueryType,
    pub timeout_seconds: u32,
    pub max_rows: u32,
    pub max_output_bytes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcomeStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerErrorType {
    #[serde(rename = "SQL_POLICY_VIOLATION")]
    SqlPolicyViolation,
    #[serde(rename = "FEATURE_DISABLED")]
    FeatureDisabled,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "RUNNER_TIMEOUT")]
    RunnerTimeout,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SQL_EXECUTION_ERROR")]
    SqlExecutionError,
    #[serde(rename = "PYTHON_EXECUTION_ERROR")]
    PythonExecutionError,
    #[serde(rename = "PYTHON_POLICY_VIOLATION")]
    PythonPolicyViolation,
    #[serde(rename = "RUNNER_INTERNAL_ERROR")]
    RunnerInternalError,
    #[serde(rename = "AGENT_RECURSION_LIMIT")]
    AgentRecursionLimit,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

impl std::fmt::Display for RunnerErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            RunnerErrorType::SqlPolicyViolation => "SQL_POLICY_VIOLATION",
            RunnerErrorType::FeatureDisabled => "FEATURE_DISABLED",
            RunnerErrorType::ValidationError => "VALIDATION_ERROR",
            RunnerErrorType::RunnerTimeout => "RUNNER_TIMEOUT",
            RunnerErrorType::Timeout => "TIMEOUT",
            RunnerErrorType::SqlExecutionError => "SQL_EXECUTION_ERROR",
            RunnerErrorType::PythonExecutionError => "PYTHON_EXECUTION_ERROR",
            RunnerErrorType::PythonPolicyViolation => "PYTHON_POLICY_VIOLATION",
            RunnerErrorType::RunnerInternalError => "RUNNER_INTERNAL_ERROR",
            RunnerErrorType::AgentRecursionLimit => "AGENT_RECURSION_LIMIT",
            RunnerErrorType::NotFound => "NOT_FOUND",
        };
        write!(f, "{token}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerErrorDetail {
    #[serde(rename = "type")]
    pub error_type: RunnerErrorType,
    pub message: String,
}

/// The value a sandbox runner emits on stdout (or the synthetic
/// equivalent produced by the policy gate / feature gate before ever
/// reaching a sandbox).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    pub status: RunOutcomeStatus,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub exec_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_trunc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_trunc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunnerErrorDetail>,
}

impl RunnerResult {
    pub fn error(error_type: RunnerErrorType, message: impl Into<String>) -> Self {
        Self {
            status: RunOutcomeStatus::Error,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            exec_time_ms: 0,
            stdout_trunc: None,
            stderr_trunc: None,
            error: Some(RunnerErrorDetail {
                error_type,
                message: message.into(),
            }),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: RunOutcomeStatus::Timeout,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            exec_time_ms: 0,
            stdout_trunc: None,
            stderr_trunc: None,
            error: Some(RunnerErrorDetail {
                error_type: RunnerErrorType::RunnerTimeout,
                message: message.into(),
            }),
        }
    }

    pub(crate) fn empty_stdout_error() -> Self {
        Self::error(
            RunnerErrorType::RunnerInternalError,
            "Runner returned empty stdout.",
        )
    }

    pub(crate) fn invalid_json_error() -> Self {
        Self::error(
            RunnerErrorType::RunnerInternalError,
            "Runner returned invalid JSON.",
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub run_id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub result: RunnerResult,
}

pub(crate) fn outcome_status(result: &RunnerResult) -> RunStatus {
    match result.status {
        RunOutcomeStatus::Success => RunStatus::Succeeded,
        RunOutcomeStatus::Error | RunOutcomeStatus::Timeout => RunStatus::Failed,
    }
}
