use async_trait::async_trait;

use crate::types::{QueryType, RunnerPayload, RunnerResult, StatusEnvelope, SubmitOutcome};

/// Capability-set abstraction over "run this payload somewhere isolated".
/// Identical contract across the local-daemon, cluster-job, and
/// remote-microsandbox providers: `submit_run` never throws, errors are
/// encoded in `result.error`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit_run(&self, payload: RunnerPayload, mode: QueryType) -> SubmitOutcome;
    async fn get_status(&self, run_id: &str) -> StatusEnvelope;
    async fn get_result(&self, run_id: &str) -> Option<RunnerResult>;
    async fn cleanup(&self, run_id: &str);
}
