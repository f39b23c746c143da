use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use analyst_datasets::{dataset_schema, Registry};

use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct Args {
    dataset_id: String,
}

pub struct GetDatasetSchemaTool {
    registry: Arc<Registry>,
}

impl GetDatasetSchemaTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for GetDatasetSchemaTool {
    fn name(&self) -> &str {
        "get_dataset_schema"
    }

    fn description(&self) -> &str {
        "Return a dataset's per-file column schema plus up to three sample rows per file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dataset_id": {"type": "string"}
            },
            "required": ["dataset_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: Args = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        match dataset_schema(&self.registry, &args.dataset_id) {
            Ok(projection) => ToolOutput::json(&call.id, &projection),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_one_dataset() -> Arc<Registry> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ecommerce")).unwrap();
        std::fs::write(
            dir.path().join("ecommerce/orders.csv"),
            "order_id,total\n1,9.99\n",
        )
        .unwrap();
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
    async fn returns_schema_for_known_dataset() {
        let tool = GetDatasetSchemaTool::new(registry_with_one_dataset());
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "get_dataset_schema".into(),
                args: json!({"dataset_id": "ecommerce"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("orders.csv"));
    }

    #[tokio::test]
    async fn unknown_dataset_is_error() {
        let tool = GetDatasetSchemaTool::new(registry_with_one_dataset());
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "get_dataset_schema".into(),
                args: json!({"dataset_id": "nope"}),
            })
            .await;
        assert!(out.is_error);
    }
}
