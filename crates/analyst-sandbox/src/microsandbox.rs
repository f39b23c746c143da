use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::executor::Executor;
use crate::parsing::parse_runner_output;
use crate::types::{
    outcome_status, QueryType, RunStatus, RunnerErrorType, RunnerPayload, RunnerResult,
    StatusEnvelope, SubmitOutcome,
};
use analyst_config::MicrosandboxConfig;

/// Hand-rolled JSON-RPC 2.0 client over `reqwest`, in the same manual
/// wire-construction style the model-provider drivers use for their own
/// protocols rather than a generic JSON-RPC crate.
pub struct MicrosandboxExecutor {
    http: reqwest::Client,
    server_url: String,
    api_key: Option<String>,
    namespace: String,
    runner_image: String,
    datasets_dir: String,
    memory_mb: u32,
    cpus: f32,
    status: Arc<DashMap<String, RunStatus>>,
    results: Arc<DashMap<String, RunnerResult>>,
}

#[derive(Debug)]
enum RpcErrorClass {
    BadRegistry,
    Internal,
    HttpStatus(u16),
}

impl MicrosandboxExecutor {
    pub fn new(
        runner_image: impl Into<String>,
        datasets_dir: impl Into<String>,
        cfg: MicrosandboxConfig,
    ) -> anyhow::Result<Self> {
        let server_url = cfg
            .server_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("microsandbox server_url is required"))?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            server_url,
            api_key: cfg.api_key,
            namespace: cfg.namespace.unwrap_or_else(|| "default".to_string()),
            runner_image: runner_image.into(),
            datasets_dir: datasets_dir.into(),
            memory_mb: cfg.memory_mb,
            cpus: cfg.cpu,
            status: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
        })
    }

    /// Normalizes a bare host, a `.../api/v1` base, or a full `.../rpc`
    /// URL to the canonical RPC endpoint.
    fn rpc_url(&self) -> String {
        let server = self.server_url.trim().trim_end_matches('/');
        if server.ends_with("/api/v1/rpc") {
            server.to_string()
        } else if server.ends_with("/api/v1") {
            format!("{server}/rpc")
        } else if server.contains("/api/v1/") {
            server.to_string()
        } else {
            format!("{server}/api/v1/rpc")
        }
    }

    fn health_url(&self) -> String {
        let rpc = self.rpc_url();
        if let Some(base) = rpc.strip_suffix("/rpc") {
            format!("{base}/health")
        } else {
            let parsed = reqwest::Url::parse(&rpc).ok();
            match parsed {
                Some(u) => format!(
                    "{}://{}/api/v1/health",
                    u.scheme(),
                    u.host_str().unwrap_or_default()
                ),
                None => format!("{rpc}/health"),
            }
        }
    }

    async fn validate_connectivity(&self) -> anyhow::Result<()> {
        let resp = self.http.get(self.health_url()).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("microsandbox health check returned {}", resp.status());
        }
        Ok(())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, RpcErrorClass> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });

        let mut req = self.http.post(self.rpc_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|_| RpcErrorClass::Internal)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RpcErrorClass::HttpStatus(status.as_u16()));
        }
        let payload: Value = resp.json().await.map_err(|_| RpcErrorClass::Internal)?;
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            if message.to_lowercase().contains("registry") {
                return Err(RpcErrorClass::BadRegistry);
            }
            return Err(RpcErrorClass::Internal);
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn start_sandbox(&self, run_id: &str) -> Result<String, RpcErrorClass> {
        let name = format!("analyst-{}", &run_id[..8.min(run_id.len())]);
        let volume = format!("{}:/data:ro", self.datasets_dir);
        self.rpc(
            "sandbox.start",
            json!({
                "sandbox": name,
                "namespace": self.namespace,
                "config": {
                    "image": self.runner_image,
                    "memory": self.memory_mb,
                    "cpus": self.cpus,
                    "volumes": [volume],
                }
            }),
        )
        .await?;
        Ok(name)
    }

    fn build_runner_code(payload: &RunnerPayload, mode: QueryType) -> String {
        let path = match mode {
            QueryType::Python => "/app/runner_python.py",
            QueryType::Sql => "/app/runner.py",
        };
        let payload_json = serde_json::to_string(payload).unwrap_or_default();
        let timeout = payload.timeout_seconds + 5;
        format!(
            "import subprocess, sys\n\
             payload = {payload_json:?}\n\
             cmd = ['python3', '{path}']\n\
             proc = subprocess.run(cmd, input=payload, text=True, capture_output=True, timeout={timeout})\n\
             sys.stdout.write(proc.stdout or '')\n\
             sys.stderr.write(proc.stderr or '')\n"
        )
    }

    fn extract_output(repl_result: &Value) -> (String, String) {
        let stdout = repl_result
            .get("output")
            .or_else(|| repl_result.get("stdout"))
            .or_else(|| repl_result.get("result"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let stderr = repl_result
            .get("stderr")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        (stdout, stderr)
    }

    async fn stop_sandbox(&self, name: &str) {
        let _ = self
            .rpc(
                "sandbox.stop",
                json!({"sandbox": name, "namespace": self.namespace}),
            )
            .await;
    }

    /// Local fallback invoked when the RPC path fails with a known class
    /// (bad registry, internal error, 4xx/5xx): runs a generated bootstrap
    /// script through a local sandbox binary with a bounded subprocess
    /// timeout, instead of failing the run outright.
    async fn run_via_cli_fallback(&self, payload: &RunnerPayload, mode: QueryType) -> RunnerResult {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let script = Self::build_runner_code(payload, mode);
        let timeout = Duration::from_secs(payload.timeout_seconds as u64 + 5);

        let mut cmd = Command::new("msb");
        cmd.args(["run", "--volume", &format!("{}:/data:ro", self.datasets_dir)]);
        cmd.arg(&self.runner_image);
        cmd.args(["python3", "-c", &script]);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let run_fut = async {
            let mut child = cmd.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
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
                RunnerErrorType::RunnerInternalError,
                format!("CLI fallback failed to spawn: {e}"),
            ),
            Err(_) => RunnerResult::timeout(format!(
                "Query exceeded timeout of {} seconds",
                payload.timeout_seconds
            )),
        }
    }

    async fn run(&self, payload: RunnerPayload, mode: QueryType, run_id: &str) -> RunnerResult {
        if let Err(e) = self.validate_connectivity().await {
            return RunnerResult::error(
                RunnerErrorType::RunnerInternalError,
                format!("MicroSandbox server is not reachable: {e}"),
            );
        }

        let sandbox_name = match self.start_sandbox(run_id).await {
            Ok(name) => name,
            Err(class) => return self.handle_rpc_error(class, &payload, mode).await,
        };

        let code = Self::build_runner_code(&payload, mode);
        let timeout = payload.timeout_seconds + 5;
        let repl_result = self
            .rpc(
                "sandbox.repl.run",
                json!({
                    "sandbox": sandbox_name,
                    "namespace": self.namespace,
                    "language": "python",
                    "code": code,
                    "timeout": timeout,
                }),
            )
            .await;

        let result = match repl_result {
            Ok(repl) => {
                let (stdout, stderr) = Self::extract_output(&repl);
                parse_runner_output(&stdout, &stderr)
            }
            Err(class) => {
                self.stop_sandbox(&sandbox_name).await;
                return self.handle_rpc_error(class, &payload, mode).await;
            }
        };

        self.stop_sandbox(&sandbox_name).await;
        result
    }

    async fn handle_rpc_error(
        &self,
        class: RpcErrorClass,
        payload: &RunnerPayload,
        mode: QueryType,
    ) -> RunnerResult {
        match class {
            RpcErrorClass::BadRegistry | RpcErrorClass::Internal | RpcErrorClass::HttpStatus(_) => {
                self.run_via_cli_fallback(payload, mode).await
            }
        }
    }
}

#[async_trait]
impl Executor for MicrosandboxExecutor {
    async fn submit_run(&self, payload: RunnerPayload, mode: QueryType) -> SubmitOutcome {
        let run_id = Uuid::new_v4().to_string();
        self.status.insert(run_id.clone(), RunStatus::Running);

        let result = self.run(payload, mode, &run_id).await;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(server_url: &str) -> MicrosandboxExecutor {
        MicrosandboxExecutor::new(
            "analyst-runner:latest",
            "/tmp/datasets",
            MicrosandboxConfig {
                server_url: Some(server_url.to_string()),
                api_key: None,
                namespace: None,
                memory_mb: 512,
                cpu: 1.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn normalizes_bare_host() {
        let e = executor("http://msb.local:5555");
        assert_eq!(e.rpc_url(), "http://msb.local:5555/api/v1/rpc");
    }

    #[test]
    fn normalizes_api_v1_base() {
        let e = executor("http://msb.local:5555/api/v1");
        assert_eq!(e.rpc_url(), "http://msb.local:5555/api/v1/rpc");
    }

    #[test]
    fn passes_through_full_rpc_url() {
        let e = executor("http://msb.local:5555/api/v1/rpc");
        assert_eq!(e.rpc_url(), "http://msb.local:5555/api/v1/rpc");
    }

    #[test]
    fn health_url_derived_from_rpc_url() {
        let e = executor("http://msb.local:5555");
        assert_eq!(e.health_url(), "http://msb.local:5555/api/v1/health");
    }

    #[test]
    fn extract_output_prefers_output_field() {
        let v = json!({"output": "stdout text", "stdout": "ignored"});
        let (stdout, _) = MicrosandboxExecutor::extract_output(&v);
        assert_eq!(stdout, "stdout text");
    }

    #[test]
    fn extract_output_falls_back_to_result_field() {
        let v = json!({"result": "fallback text"});
        let (stdout, _) = MicrosandboxExecutor::extract_output(&v);
        assert_eq!(stdout, "fallback text");
    }
}
