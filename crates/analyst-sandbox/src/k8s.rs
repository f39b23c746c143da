use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EmptyDirVolumeSource, EnvVar, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::{Client, ResourceExt};
use uuid::Uuid;

use crate::executor::Executor;
use crate::parsing::parse_runner_output;
use crate::types::{
    outcome_status, QueryType, RunStatus, RunnerErrorType, RunnerPayload, RunnerResult,
    StatusEnvelope, SubmitOutcome,
};
use analyst_config::K8sConfig;

const LOG_REREAD_ATTEMPTS: u32 = 4;
const LOG_REREAD_DELAY: Duration = Duration::from_millis(200);

/// Runs one short-lived batch/v1 `Job` per query, feeding the payload in
/// via an environment variable and fetching the result off the pod's
/// logs — mirrors the original Python executor's job-per-run model,
/// rewritten against `kube`/`k8s-openapi` instead of the Python client.
pub struct K8sJobExecutor {
    client: Client,
    runner_image: String,
    namespace: String,
    cfg: K8sConfig,
    keep_jobs: bool,
    status: Arc<DashMap<String, RunStatus>>,
    results: Arc<DashMap<String, RunnerResult>>,
    job_names: Arc<DashMap<String, String>>,
}

impl K8sJobExecutor {
    pub async fn new(runner_image: impl Into<String>, cfg: K8sConfig) -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        let namespace = cfg.namespace.clone();
        let keep_jobs = std::env::var("K8S_KEEP_JOBS")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self {
            client,
            runner_image: runner_image.into(),
            namespace,
            cfg,
            keep_jobs,
            status: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
            job_names: Arc::new(DashMap::new()),
        })
    }

    fn job_name(run_id: &str) -> String {
        format!("analyst-{}", &run_id[..8.min(run_id.len())])
    }

    fn runner_script(mode: QueryType) -> &'static str {
        match mode {
            QueryType::Python => "/app/runner_python.py",
            QueryType::Sql => "/app/runner.py",
        }
    }

    fn bootstrap_code(mode: QueryType) -> String {
        let script = Self::runner_script(mode);
        format!(
            "import os, subprocess, sys\n\
             payload = os.environ.get('RUNNER_REQUEST_JSON', '')\n\
             proc = subprocess.run(['python3', '{script}'], input=payload, text=True, capture_output=True)\n\
             sys.stdout.write(proc.stdout or '')\n\
             sys.exit(proc.returncode)\n"
        )
    }

    fn build_job(&self, job_name: &str, payload: &RunnerPayload, mode: QueryType) -> Job {
        let mut volumes = vec![Volume {
            name: "tmp".into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }];
        let mut volume_mounts = vec![VolumeMount {
            name: "tmp".into(),
            mount_path: "/tmp".into(),
            ..Default::default()
        }];

        if let Some(pvc) = &self.cfg.dataset_pvc {
            volumes.push(Volume {
                name: "datasets".into(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pvc.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
            volume_mounts.push(VolumeMount {
                name: "datasets".into(),
                mount_path: "/data".into(),
                read_only: Some(true),
                ..Default::default()
            });
        }

        let payload_json = serde_json::to_string(payload).unwrap_or_default();
        let mut limits = BTreeMap::new();
        limits.insert("cpu".to_string(), Quantity(self.cfg.cpu_limit.clone()));
        limits.insert("memory".to_string(), Quantity(self.cfg.memory_limit.clone()));

        let container = Container {
            name: "runner".into(),
            image: Some(self.runner_image.clone()),
            image_pull_policy: Some(self.cfg.image_pull_policy.clone()),
            command: Some(vec![
                "python3".into(),
                "-c".into(),
                Self::bootstrap_code(mode),
            ]),
            env: Some(vec![EnvVar {
                name: "RUNNER_REQUEST_JSON".into(),
                value: Some(payload_json),
                ..Default::default()
            }]),
            volume_mounts: Some(volume_mounts),
            resources: Some(ResourceRequirements {
                limits: Some(limits.clone()),
                requests: Some(limits),
                ..Default::default()
            }),
            security_context: Some(SecurityContext {
                run_as_non_root: Some(true),
                run_as_user: Some(1000),
                run_as_group: Some(1000),
                allow_privilege_escalation: Some(false),
                read_only_root_filesystem: Some(true),
                capabilities: Some(Capabilities {
                    drop: Some(vec!["ALL".into()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            restart_policy: Some("Never".into()),
            containers: vec![container],
            volumes: Some(volumes),
            service_account_name: self.cfg.service_account.clone(),
            ..Default::default()
        };

        let mut labels = BTreeMap::new();
        labels.insert(
            "app.kubernetes.io/name".to_string(),
            "analyst-runner".to_string(),
        );
        labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            "analyst-agent".to_string(),
        );

        Job {
            metadata: ObjectMeta {
                name: Some(job_name.to_string()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                backoff_limit: Some(0),
                active_deadline_seconds: Some(payload.timeout_seconds as i64 + 5),
                ttl_seconds_after_finished: Some(self.cfg.job_ttl_seconds as i32),
                ..Default::default()
            }),
            status: None,
        }
    }

    async fn wait_for_terminal_state(&self, jobs: &Api<Job>, job_name: &str, timeout_seconds: u32) -> &'static str {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs((timeout_seconds as u64 + 5).max(5));
        let poll_interval = Duration::from_millis(self.cfg.poll_interval_ms);
        loop {
            if tokio::time::Instant::now() >= deadline {
                return "timeout";
            }
            match jobs.get(job_name).await {
                Ok(job) => {
                    if let Some(status) = job.status {
                        if status.succeeded.unwrap_or(0) > 0 {
                            return "succeeded";
                        }
                        if status.failed.unwrap_or(0) > 0 {
                            return "failed";
                        }
                    }
                }
                Err(_) => return "failed",
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn read_job_logs(&self, pods: &Api<k8s_openapi::api::core::v1::Pod>, job_name: &str) -> String {
        let lp = ListParams::default().labels(&format!("job-name={job_name}"));
        let Ok(list) = pods.list(&lp).await else {
            return String::new();
        };
        let Some(pod) = list.items.into_iter().next() else {
            return String::new();
        };
        pods.logs(&pod.name_any(), &LogParams::default())
            .await
            .unwrap_or_default()
    }

    fn is_parse_failure(result: &RunnerResult) -> bool {
        result
            .error
            .as_ref()
            .map(|e| e.error_type == RunnerErrorType::RunnerInternalError)
            .unwrap_or(false)
    }

    async fn delete_job(&self, jobs: &Api<Job>, job_name: &str) {
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        let _ = jobs.delete(job_name, &dp).await;
    }

    async fn run(&self, payload: RunnerPayload, mode: QueryType, run_id: &str) -> RunnerResult {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
        let pods: Api<k8s_openapi::api::core::v1::Pod> =
            Api::namespaced(self.client.clone(), &self.namespace);

        let job_name = Self::job_name(run_id);
        self.job_names.insert(run_id.to_string(), job_name.clone());
        let timeout_seconds = payload.timeout_seconds;
        let job = self.build_job(&job_name, &payload, mode);

        let result = match jobs.create(&PostParams::default(), &job).await {
            Ok(_) => {
                let terminal = self
                    .wait_for_terminal_state(&jobs, &job_name, timeout_seconds)
                    .await;

                let mut stdout = self.read_job_logs(&pods, &job_name).await;
                let mut result = parse_runner_output(&stdout, "");

                if terminal == "succeeded" && Self::is_parse_failure(&result) {
                    for _ in 0..LOG_REREAD_ATTEMPTS {
                        tokio::time::sleep(LOG_REREAD_DELAY).await;
                        stdout = self.read_job_logs(&pods, &job_name).await;
                        result = parse_runner_output(&stdout, "");
                        if !Self::is_parse_failure(&result) {
                            break;
                        }
                    }
                }

                match terminal {
                    "timeout" => RunnerResult::timeout(format!(
                        "Query exceeded timeout of {timeout_seconds} seconds"
                    )),
                    "failed" if result.status == crate::types::RunOutcomeStatus::Success => {
                        RunnerResult::error(
                            RunnerErrorType::RunnerInternalError,
                            "Kubernetes Job failed before returning a valid result.",
                        )
                    }
                    _ => result,
                }
            }
            Err(e) => RunnerResult::error(
                RunnerErrorType::RunnerInternalError,
                format!("failed to create sandbox job: {e}"),
            ),
        };

        if !self.keep_jobs {
            self.delete_job(&jobs, &job_name).await;
        }

        result
    }
}

#[async_trait]
impl Executor for K8sJobExecutor {
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
        if let Some((_, job_name)) = self.job_names.remove(run_id) {
            let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
            self.delete_job(&jobs, &job_name).await;
        }
        self.status.remove(run_id);
        self.results.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_is_short_and_prefixed() {
        let name = K8sJobExecutor::job_name("abcdefgh-1234-5678-9999-000000000000");
        assert_eq!(name, "analyst-abcdefgh");
    }

    #[test]
    fn runner_script_selects_python_variant() {
        assert_eq!(
            K8sJobExecutor::runner_script(QueryType::Python),
            "/app/runner_python.py"
        );
        assert_eq!(K8sJobExecutor::runner_script(QueryType::Sql), "/app/runner.py");
    }
}
