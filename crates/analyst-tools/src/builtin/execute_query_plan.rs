use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use analyst_config::SandboxConfig;
use analyst_datasets::Registry;
use analyst_query::{normalize_sql_for_dataset, validate_sql_policy, QueryPlan, QueryPlanCompiler};
use analyst_sandbox::{Executor, QueryType, RunnerErrorType, RunnerResult};

use crate::envelope::ExecutionEnvelope;
use crate::tool::{Tool, ToolCall, ToolOutput};

use super::payload::base_payload;

#[derive(Deserialize)]
struct Args {
    dataset_id: String,
    plan: QueryPlan,
}

pub struct ExecuteQueryPlanTool {
    registry: Arc<Registry>,
    executor: Arc<dyn Executor>,
    sandbox: SandboxConfig,
    compiler: QueryPlanCompiler,
}

impl ExecuteQueryPlanTool {
    pub fn new(registry: Arc<Registry>, executor: Arc<dyn Executor>, sandbox: SandboxConfig) -> Self {
        Self {
            registry,
            executor,
            sandbox,
            compiler: QueryPlanCompiler::new(),
        }
    }
}

#[async_trait]
impl Tool for ExecuteQueryPlanTool {
    fn name(&self) -> &str {
        "execute_query_plan"
    }

    fn description(&self) -> &str {
        "Compile a structured query plan to read-only SQL, run it in the sandbox, and return the result envelope."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dataset_id": {"type": "string"},
                "plan": {"type": "object"}
            },
            "required": ["dataset_id", "plan"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let mut args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        args.plan.dataset_id = args.dataset_id.clone();

        let ds = match self.registry.get(&args.dataset_id) {
            Ok(ds) => ds,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };

        let plan_json = serde_json::to_value(&args.plan).unwrap_or(Value::Null);

        if let Err(e) = args.plan.validate() {
            let envelope = ExecutionEnvelope::from_result(RunnerResult::error(
                RunnerErrorType::ValidationError,
                e.to_string(),
            ))
            .with_plan_json(plan_json);
            return ToolOutput::json(&call.id, &envelope);
        }

        let compiled = match self.compiler.compile(&args.plan) {
            Ok(sql) => sql,
            Err(e) => {
                let envelope = ExecutionEnvelope::from_result(RunnerResult::error(
                    RunnerErrorType::ValidationError,
                    e.to_string(),
                ))
                .with_plan_json(plan_json);
                return ToolOutput::json(&call.id, &envelope);
            }
        };

        let normalized = normalize_sql_for_dataset(&compiled, &args.dataset_id);

        if let Err(reason) = validate_sql_policy(&normalized) {
            let envelope = ExecutionEnvelope::from_result(RunnerResult::error(
                RunnerErrorType::SqlPolicyViolation,
                reason,
            ))
            .with_compiled_sql(normalized)
            .with_plan_json(plan_json);
            return ToolOutput::json(&call.id, &envelope);
        }

        let mut payload = base_payload(&self.sandbox, ds, QueryType::Sql);
        payload.sql = Some(normalized.clone());

        let outcome = self.executor.submit_run(payload, QueryType::Sql).await;
        let envelope = ExecutionEnvelope::from_result(outcome.result)
            .with_compiled_sql(normalized)
            .with_plan_json(plan_json);
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
    async fn compiles_and_executes_valid_plan() {
        let tool = ExecuteQueryPlanTool::new(
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
                name: "execute_query_plan".into(),
                args: json!({
                    "dataset_id": "ecommerce",
                    "plan": {"dataset_id": "ignored", "table": "orders", "limit": 10}
                }),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("\"compiled_sql\""));
        assert!(out.content.contains("\"plan_json\""));
    }

    #[tokio::test]
    async fn invalid_plan_yields_validation_error_without_reaching_executor() {
        let tool = ExecuteQueryPlanTool::new(
            registry_with_one_dataset(),
            Arc::new(MockExecutor::always_success(vec![], vec![])),
            SandboxConfig::default(),
        );
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "execute_query_plan".into(),
                args: json!({
                    "dataset_id": "ecommerce",
                    "plan": {"dataset_id": "ecommerce", "table": "orders", "limit": 99999}
                }),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("VALIDATION_ERROR"));
    }
}
