use std::collections::HashMap;

use analyst_model::{Message, MessageContent, Role};
use analyst_sandbox::{RunOutcomeStatus, RunnerErrorDetail, RunnerErrorType, RunnerResult};
use analyst_tools::EXECUTION_TOOL_NAMES;
use chrono::{DateTime, Utc};

use crate::types::{QueryMode, RunCapsule, RunStatus};

fn execution_mode(tool_name: &str) -> Option<QueryMode> {
    match tool_name {
        "execute_sql" => Some(QueryMode::Sql),
        "execute_query_plan" => Some(QueryMode::Plan),
        "execute_python" => Some(QueryMode::Python),
        _ => None,
    }
}

fn is_execution_tool(tool_name: &str) -> bool {
    EXECUTION_TOOL_NAMES.contains(&tool_name)
}

/// Walks a turn's message trace and derives its run capsule, per the
/// two-pass fold described for the capsule extractor: first recover which
/// tool name each call id belongs to, then fold over the trace in order,
/// tracking the most recent execution-tool inputs/outputs and the last
/// text-only assistant reply.
pub fn extract_capsule(
    trace: &[Message],
    run_id: impl Into<String>,
    created_at: DateTime<Utc>,
    dataset_id: impl Into<String>,
    dataset_version_hash: Option<String>,
    question: impl Into<String>,
    exec_time_ms: u64,
) -> (RunCapsule, Option<String>) {
    let mut call_id_to_tool: HashMap<String, String> = HashMap::new();
    for msg in trace {
        if let MessageContent::ToolCall {
            tool_call_id,
            function,
        } = &msg.content
        {
            call_id_to_tool.insert(tool_call_id.clone(), function.name.clone());
        }
    }

    let mut query_mode = QueryMode::Chat;
    let mut compiled_sql: Option<String> = None;
    let mut plan_json: Option<serde_json::Value> = None;
    let mut python_code: Option<String> = None;
    let mut last_assistant_text: Option<String> = None;
    let mut result_json: Option<RunnerResult> = None;
    let mut last_error: Option<RunnerErrorDetail> = None;

    for msg in trace {
        match (&msg.role, &msg.content) {
            (Role::Assistant, MessageContent::Text(text)) => {
                last_assistant_text = Some(text.clone());
            }
            (Role::Assistant, MessageContent::ToolCall {
                function, ..
            }) => {
                if let Some(mode) = execution_mode(&function.name) {
                    query_mode = mode;
                    if let Ok(args) = serde_json::from_str::<serde_json::Value>(&function.arguments) {
                        match function.name.as_str() {
                            "execute_sql" => {
                                if let Some(sql) = args.get("sql").and_then(|v| v.as_str()) {
                                    compiled_sql = Some(sql.to_string());
                                }
                            }
                            "execute_query_plan" => {
                                if let Some(plan) = args.get("plan") {
                                    plan_json = Some(plan.clone());
                                }
                            }
                            "execute_python" => {
                                if let Some(code) = args.get("python_code").and_then(|v| v.as_str())
                                {
                                    python_code = Some(code.to_string());
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            (Role::Tool, MessageContent::ToolResult {
                tool_call_id,
                content,
            }) => {
                let tool_name = call_id_to_tool.get(tool_call_id).map(String::as_str);
                if tool_name.map(is_execution_tool).unwrap_or(false) {
                    if let Ok(result) = serde_json::from_str::<RunnerResult>(content) {
                        if let Some(err) = &result.error {
                            last_error = Some(err.clone());
                        }
                        result_json = Some(result);
                    }
                }
            }
            _ => {}
        }
    }

    let status = derive_status(query_mode, result_json.as_ref(), last_error.as_ref());

    let result_json = result_json.unwrap_or(RunnerResult {
        status: RunOutcomeStatus::Success,
        columns: Vec::new(),
        rows: Vec::new(),
        row_count: 0,
        exec_time_ms,
        stdout_trunc: None,
        stderr_trunc: None,
        error: None,
    });

    let capsule = RunCapsule {
        run_id: run_id.into(),
        created_at,
        dataset_id: dataset_id.into(),
        dataset_version_hash,
        question: question.into(),
        query_mode,
        plan_json,
        compiled_sql,
        python_code,
        status,
        result_json,
        error_json: last_error,
        exec_time_ms,
    };

    (capsule, last_assistant_text)
}

fn derive_status(
    mode: QueryMode,
    result: Option<&RunnerResult>,
    last_error: Option<&RunnerErrorDetail>,
) -> RunStatus {
    if mode == QueryMode::Chat && result.is_none() {
        return RunStatus::Succeeded;
    }
    if let Some(result) = result {
        if result.status == RunOutcomeStatus::Success {
            return RunStatus::Succeeded;
        }
        if result.status == RunOutcomeStatus::Timeout {
            return RunStatus::TimedOut;
        }
    }
    if let Some(err) = last_error {
        if err.error_type == RunnerErrorType::Timeout {
            return RunStatus::TimedOut;
        }
        if matches!(
            err.error_type,
            RunnerErrorType::SqlPolicyViolation | RunnerErrorType::FeatureDisabled
        ) {
            return RunStatus::Rejected;
        }
    }
    RunStatus::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_model::FunctionCall;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn chat_only_trace_is_succeeded() {
        let trace = vec![
            Message::user("how many rows are there?"),
            Message::assistant("I can't tell without running a query."),
        ];
        let (capsule, text) =
            extract_capsule(&trace, "run-1", now(), "ecommerce", None, "q", 5);
        assert_eq!(capsule.query_mode, QueryMode::Chat);
        assert_eq!(capsule.status, RunStatus::Succeeded);
        assert_eq!(text.as_deref(), Some("I can't tell without running a query."));
    }

    #[test]
    fn successful_sql_execution_populates_compiled_sql_and_result() {
        let trace = vec![
            Message::user("count orders"),
            Message::tool_call(
                "call-1",
                FunctionCall {
                    name: "execute_sql".into(),
                    arguments: r#"{"dataset_id":"ecommerce","sql":"SELECT COUNT(*) FROM orders"}"#
                        .into(),
                },
            ),
            Message::tool_result(
                "call-1",
                r#"{"status":"success","columns":["n"],"rows":[[1]],"row_count":1,"exec_time_ms":12}"#,
            ),
            Message::assistant("There is 1 order."),
        ];
        let (capsule, _) = extract_capsule(&trace, "run-2", now(), "ecommerce", None, "q", 12);
        assert_eq!(capsule.query_mode, QueryMode::Sql);
        assert_eq!(capsule.status, RunStatus::Succeeded);
        assert_eq!(
            capsule.compiled_sql.as_deref(),
            Some("SELECT COUNT(*) FROM orders")
        );
        assert_eq!(capsule.result_json.row_count, 1);
    }

    #[test]
    fn sql_policy_violation_is_rejected() {
        let trace = vec![
            Message::tool_call(
                "call-1",
                FunctionCall {
                    name: "execute_sql".into(),
                    arguments: r#"{"dataset_id":"x","sql":"DROP TABLE orders"}"#.into(),
                },
            ),
            Message::tool_result(
                "call-1",
                r#"{"status":"error","error":{"type":"SQL_POLICY_VIOLATION","message":"blocked token: drop"}}"#,
            ),
        ];
        let (capsule, _) = extract_capsule(&trace, "run-3", now(), "x", None, "q", 1);
        assert_eq!(capsule.status, RunStatus::Rejected);
    }

    #[test]
    fn timeout_error_type_is_timed_out() {
        let trace = vec![
            Message::tool_call(
                "call-1",
                FunctionCall {
                    name: "execute_python".into(),
                    arguments: r#"{"dataset_id":"x","python_code":"while True: pass"}"#.into(),
                },
            ),
            Message::tool_result(
                "call-1",
                r#"{"status":"timeout","error":{"type":"RUNNER_TIMEOUT","message":"exceeded budget"}}"#,
            ),
        ];
        let (capsule, _) = extract_capsule(&trace, "run-4", now(), "x", None, "q", 1);
        assert_eq!(capsule.status, RunStatus::TimedOut);
    }

    #[test]
    fn non_execution_tool_result_does_not_populate_result_json() {
        let trace = vec![
            Message::tool_call(
                "call-1",
                FunctionCall {
                    name: "list_datasets".into(),
                    arguments: "{}".into(),
                },
            ),
            Message::tool_result("call-1", r#"[{"id":"ecommerce"}]"#),
            Message::assistant("Here are the datasets."),
        ];
        let (capsule, _) = extract_capsule(&trace, "run-5", now(), "x", None, "q", 1);
        assert_eq!(capsule.query_mode, QueryMode::Chat);
        assert_eq!(capsule.status, RunStatus::Succeeded);
        assert_eq!(capsule.result_json.row_count, 0);
    }
}
