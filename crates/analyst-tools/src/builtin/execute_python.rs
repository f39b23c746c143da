use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use analyst_config::SandboxConfig;
use analyst_datasets::Registry;
use analyst_sandbox::{Executor, QueryType, RunnerErrorType, RunnerResult};

use crate::envelope::ExecutionEnvelope;
use crate::tool::{Tool, ToolCall, ToolOutput};

use super::payload::base_payload;

#[derive(Deserialize)]
struct Args {
    dataset_id: String,
    python_code: String,
}

pub struct ExecutePythonTool {
    registry: Arc<Registry>,
    executor: Arc<dyn Executor>,
    sandbox: SandboxConfig,
}

impl ExecutePythonTool {
    pub fn new(registry: Arc<Registry>, executor: Arc<dyn Executor>, sandbox: SandboxConfig) -> Self {
        Self {
            registry,
            executor,
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for ExecutePythonTool {
    fn name(&self) -> &str {
        "execute_python"
    }

    fn description(&self) -> &str {
        "Run pandas/numpy Python code against a dataset in the sandbox and return the result envelope. Disabled when Python execution is turned off for this deployment."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dataset_id": {"type": "string"},
                "python_code": {"type": "string"}
            },
            "required": ["dataset_id", "python_code"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        if !self.sandbox.enable_python_execution {
            let envelope = ExecutionEnvelope::from_result(RunnerResult::error(
                RunnerErrorType::FeatureDisabled,
                "Python execution is disabled for this deployment.",
            ))
            .with_python_code(args.python_code);
            return ToolOutput::json(&call.id, &envelope);
        }

        let ds = match self.registry.get(&args.dataset_id) {
            Ok(ds) => ds,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };

        let mut payload = base_payload(&self.sandbox, ds, QueryType::Python);
        payload.python_code = Some(args.python_code.clone());

        let outcome = self.executor.submit_run(payload, QueryType::Python).await;
        let envelope =
            ExecutionEnvelope::from_result(outcome.result).with_python_code(args.python_code);
        ToolOutput::json(&call.id, &envelope)
    }
}
