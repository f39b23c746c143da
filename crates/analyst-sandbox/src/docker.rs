use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::executor::Executor;
use crate::parsing::parse_runner_output;
use crate::types::{
    outcome_status, QueryType, RunStatus, RunnerPayload, RunnerResult, StatusEnvelope,
    SubmitOutcome,
};

/// Spawns a fresh, network-isolated container per run via the `docker`
/// CLI, piping the payload on stdin and reading the runner's JSON off
/// stdout — the same subprocess-isolation pattern used for shelling out
/// to an external binary elsewhere in this workspace (`stdin(Stdio::
/// null())`/pipe, `kill_on_drop(true)`), adapted here to pipe a payload
/// in rather than null it out.
pub struct DockerExecutor {
    runner_image: String,
    datasets_dir: String,
    status: Arc<DashMap<String, RunStatus>>,
    results: Arc<DashMap<String, RunnerResult>>,
}

impl DockerExecutor {
    pub fn new(runner_image: impl Into<String>, datasets_dir: impl Into<String>) -> Self {
        Self {
            runner_image: runner_image.into(),
            datasets_dir: datasets_dir.into(),
            status: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
        }
    }

    fn build_command(&self, payload: &RunnerPayload, mode: QueryType) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args([
            "run", "--rm", "-i", "--network", "none", "--read-only", "--pids-limit", "64",
            "--memory", "512m", "--cpus", "0.5", "--tmpfs",
            "/tmp:rw,noexec,nosuid,size=64m",
        ]);
        cmd.arg("-v");
        cmd.arg(format!("{}:/data:ro", self.datasets_dir));
        if mode == QueryType::Python {
            cmd.args(["--entrypoint", "python3"]);
        }
        cmd.arg(&self.runner_image);
        if mode == QueryType::Python {
            cmd.arg("/app/runner_python.py");
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, payload: RunnerPayload, mode: QueryType) -> RunnerResult {
        let payload_json = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                return RunnerResult::error(
                    crate::types::RunnerErrorType::RunnerInternalError,
                    format!("failed to serialize runner payload: {e}"),
                )
            }
        };

        let timeout = Duration::from_secs(payload.timeout_seconds as u64 + 5);
        let mut cmd = self.build_command(&payload, mode);

        let run_fut = async {
            let mut child = cmd.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload_json).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(timeout, run_fut).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                parse_runner_output(&stdout, &stderr)
            }
            Ok(Err(e)) => RunnerResult::error(
                crate::types::RunnerErrorType::RunnerInternalError,
                format!("failed to run sandbox container: {e}"),
            ),
            Err(_) => RunnerResult::timeout(format!(
                "Query exceeded timeout of {} seconds",
                payload.timeout_seconds
            )),
        }
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn submit_run(&self, payload: RunnerPayload, mode: QueryType) -> SubmitOutcome {
        let run_id = Uuid::new_v4().to_string();
        self.status.insert(run_id.clone(), RunStatus::Running);

        let result = self.run(payload, mode).await;
        let status = outcome_status(&result);
        self.status.insert(run_id.clone(), status);
        self.results.insert(run_id.clone(), result.clone());

        SubmitOutcome {
            run_id,
            status,
            result,
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
