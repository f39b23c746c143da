use analyst_sandbox::RunnerResult;
use serde::Serialize;

/// The runner envelope shape, augmented with the mode-specific fields a
/// given execution tool attaches (compiled SQL, the parsed plan, the raw
/// Python source). Non-execution tools never produce this type.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEnvelope {
    #[serde(flatten)]
    pub result: RunnerResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
}

impl ExecutionEnvelope {
    pub fn from_result(result: RunnerResult) -> Self {
        Self {
            result,
            compiled_sql: None,
            plan_json: None,
            python_code: None,
        }
    }

    pub fn with_compiled_sql(mut self, sql: impl Into<String>) -> Self {
        self.compiled_sql = Some(sql.into());
        self
    }

    pub fn with_plan_json(mut self, plan: serde_json::Value) -> Self {
        self.plan_json = Some(plan);
        self
    }

    pub fn with_python_code(mut self, code: impl Into<String>) -> Self {
        self.python_code = Some(code.into());
        self
    }
}
