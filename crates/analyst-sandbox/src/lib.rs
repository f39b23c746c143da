mod docker;
mod executor;
mod k8s;
mod microsandbox;
mod mock;
mod parsing;
mod types;

pub use docker::DockerExecutor;
pub use executor::Executor;
pub use k8s::K8sJobExecutor;
pub use microsandbox::MicrosandboxExecutor;
pub use mock::MockExecutor;
pub use parsing::parse_runner_output;
pub use types::{
    outcome_status, QueryType, RunOutcomeStatus, RunStatus, RunnerErrorDetail, RunnerErrorType,
    RunnerFile, RunnerPayload, RunnerResult, StatusEnvelope, SubmitOutcome,
};

use analyst_config::{SandboxConfig, SandboxProvider};

/// Builds the configured [`Executor`] from a [`SandboxConfig`].
pub async fn from_config(
    cfg: &SandboxConfig,
    datasets_dir: &str,
) -> anyhow::Result<Box<dyn Executor>> {
    match cfg.provider {
        SandboxProvider::Docker => Ok(Box::new(DockerExecutor::new(
            cfg.runner_image.clone(),
            datasets_dir.to_string(),
        ))),
        SandboxProvider::K8s => Ok(Box::new(
            K8sJobExecutor::new(cfg.runner_image.clone(), cfg.k8s.clone()).await?,
        )),
        SandboxProvider::Microsandbox => Ok(Box::new(MicrosandboxExecutor::new(
            cfg.runner_image.clone(),
            datasets_dir.to_string(),
            cfg.microsandbox.clone(),
        )?)),
    }
}
