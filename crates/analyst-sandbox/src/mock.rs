use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::executor::Executor;
use crate::types::{
    outcome_status, QueryType, RunStatus, RunnerPayload, RunnerResult, StatusEnvelope,
    SubmitOutcome,
};

/// In-process executor for tests: never shells out, never calls a
/// cluster or remote service. Always returns a fixed success envelope
/// unless configured otherwise, matching `sven-model::mock`'s role as a
/// dependency-free stand-in for an external driver.
pub struct MockExecutor {
    result: RunnerResult,
    status: Arc<DashMap<String, RunStatus>>,
    results: Arc<DashMap<String, RunnerResult>>,
}

impl MockExecutor {
    pub fn new(result: RunnerResult) -> Self {
        Self {
            result,
            status: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
        }
    }

    pub fn always_success(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len() as u64;
        Self::new(RunnerResult {
            status: crate::types::RunOutcomeStatus::Success,
            columns,
            rows,
            row_count,
            exec_time_ms: 1,
            stdout_trunc: None,
            stderr_trunc: None,
            error: None,
        })
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn submit_run(&self, _payload: RunnerPayload, _mode: QueryType) -> SubmitOutcome {
        let run_id = Uuid::new_v4().to_string();
        let status = outcome_status(&self.result);
        self.status.insert(run_id.clone(), status);
        self.results.insert(run_id.clone(), self.result.clone());
        SubmitOutcome {
            run_id,
            status,
            result: self.result.clone(),
        }
    }

    async fn get_status(&self, run_id: &str) -> StatusEnvelope {
        let status = self
            .status
            .get(run_id)
            .map(|s| *s)
            .unwrap_or(RunStatus::NotFound);
        StatusEnvelope {
            run_id: run_id.to_string(),
            status,
        }
    }

    async fn get_result(&self, run_id: &str) -> Option<RunnerResult> {
        self.results.get(run_id).map(|r| r.clone())
    }

    async fn cleanup(&self, run_id: &str) {
        self.status.remove(run_id);
        self.results.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunnerFile;

    fn payload() -> RunnerPayload {
        RunnerPayload {
            dataset_id: "ecommerce".into(),
            files: vec![RunnerFile {
                name: "orders.csv".into(),
                path: "/data/ecommerce/orders.csv".into(),
            }],
            query_type: QueryType::Sql,
            timeout_seconds: 10,
            max_rows: 200,
            max_output_bytes: 65536,
            sql: Some("SELECT 1".into()),
            python_code: None,
        }
    }

    #[tokio::test]
    async fn always_success_reports_succeeded() {
        let exec = MockExecutor::always_success(vec!["n".into()], vec![vec![serde_json::json!(1)]]);
        let outcome = exec.submit_run(payload(), QueryType::Sql).await;
        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.result.row_count, 1);
    }

    #[tokio::test]
    async fn cleanup_removes_bookkeeping() {
        let exec = MockExecutor::always_success(vec![], vec![]);
        let outcome = exec.submit_run(payload(), QueryType::Sql).await;
        exec.cleanup(&outcome.run_id).await;
        assert_eq!(exec.get_status(&outcome.run_id).await.status, RunStatus::NotFound);
        assert!(exec.get_result(&outcome.run_id).await.is_none());
    }
}
