use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use analyst_config::SandboxConfig;
use analyst_datasets::Registry;
use analyst_query::{normalize_sql_for_dataset, validate_sql_policy};
use analyst_sandbox::{Executor, QueryType, RunnerErrorType, RunnerResult};

use crate::envelope::ExecutionEnvelope;
use crate::tool::{Tool, ToolCall, ToolOutput};

use super::payload::base_payload;

#[derive(Deserialize)]
struct Args {
    dataset_id: String,
    sql: String,
}

pub struct ExecuteSqlTool {
    registry: Arc<Registry>,
    executor: Arc<dyn Executor>,
    sandbox: SandboxConfig,
}

impl ExecuteSqlTool {
    pub fn new(registry: Arc<Registry>, executor: Arc<dyn Executor>, sandbox: SandboxConfig) -> Self {
        Self {
            registry,
            executor,
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn description(&self) -> &str {
        "Run a read-only SELECT/WITH SQL query against a dataset in the sandbox and return the result envelope."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dataset_id": {"type": "string"},
                "sql": {"type": "string"}
            },
            "required": ["dataset_id", "sql"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let ds = match self.registry.get(&args.dataset_id) {
            Ok(ds) => ds,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };

        let normalized = normalize_sql_for_dataset(&args.sql, &args.dataset_id);

        if let Err(reason) = validate_sql_policy(&normalized) {
            let envelope = ExecutionEnvelope::from_result(RunnerResult::error(
                RunnerErrorType::SqlPolicyViolation,
                reason,
            ))
            .with_compiled_sql(normalized);
            return ToolOutput::json(&call.id, &envelope);
        }

        let mut payload = base_payload(&self.sandbox, ds, QueryType::Sql);
        payload.sql = Some(normalized.clone());

        let outcome = self.executor.submit_run(payload, QueryType::Sql).await;
        let envelope = ExecutionEnvelope::from_result(outcome.result).with_compiled_sql(normalized);
        ToolOutput::json(&call.id, &envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_sandbox::MockExecutor;

    fn registry_with_one_dataset() -> Arc<Registry> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("registry.json"),
            br#"{"datasets": [{"id": "ecommerce", "name": "E-commerce", "files": [
                {"name": "orders.csv", "path": "ecommerce/orders.csv", "schema": {}}
            ]}]}"#,
        )
        .unwrap();
        Arc::new(Registry::load(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn rejects_non_select_before_reaching_executor() {
        let tool = ExecuteSqlTool::new(
            registry_with_one_dataset(),
            Arc::new(MockExecutor::always_success(vec![], vec![])),
            SandboxConfig::default(),
        );
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "execute_sql".into(),
                args: json!({"dataset_id": "ecommerce", "sql": "DROP TABLE orders"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("SQL_POLICY_VIOLATION"));
    }

    #[tokio::test]
    async fn valid_select_reaches_executor() {
        let tool = ExecuteSqlTool::new(
            registry_with_one_dataset(),
            Arc::new(MockExecutor::always_success(
                vec!["order_id".into()],
                vec![vec![json!(1)]],
            )),
            SandboxConfig::default(),
        );
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "execute_sql".into(),
                args: json!({"dataset_id": "ecommerce", "sql": "SELECT * FROM orders"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("\"compiled_sql\""));
        assert!(out.content.contains("order_id"));
    }

    #[tokio::test]
    async fn unknown_dataset_is_error() {
        let tool = ExecuteSqlTool::new(
            registry_with_one_dataset(),
            Arc::new(MockExecutor::always_success(vec![], vec![])),
            SandboxConfig::default(),
        );
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "execute_sql".into(),
                args: json!({"dataset_id": "nope", "sql": "SELECT 1"}),
            })
            .await;
        assert!(out.is_error);
    }
}
