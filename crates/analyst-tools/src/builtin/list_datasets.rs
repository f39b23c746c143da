use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use analyst_datasets::Registry;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListDatasetsTool {
    registry: Arc<Registry>,
}

impl ListDatasetsTool {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ListDatasetsTool {
    fn name(&self) -> &str {
        "list_datasets"
    }

    fn description(&self) -> &str {
        "List every available dataset: id, display name, description, and suggested prompts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        ToolOutput::json(&call.id, &self.registry.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json as j;

    fn registry_with_one_dataset() -> Arc<Registry> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("registry.json"),
            br#"{"datasets": [{"id": "ecommerce", "name": "E-commerce", "files": []}]}"#,
        )
        .unwrap();
        Arc::new(Registry::load(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn lists_registered_datasets() {
        let tool = ListDatasetsTool::new(registry_with_one_dataset());
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "list_datasets".into(),
                args: j!({}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("ecommerce"));
    }
}
