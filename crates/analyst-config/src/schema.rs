use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level configuration for the analyst agent service.
///
/// Every field here corresponds to a named option in the "Configuration
/// (environment)" section of the system description. Environment variables
/// take priority over YAML config layers, since this service is meant to
/// run as a container rather than a developer CLI tool — see `loader.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log_level: String,
    /// Optional tracing sink for run telemetry (e.g. an OTLP collector URL).
    #[serde(default)]
    pub tracing_sink_uri: Option<String>,
    #[serde(default)]
    pub tracing_experiment_name: Option<String>,
    #[serde(default)]
    pub tracing_autolog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            datasets: DatasetsConfig::default(),
            sandbox: SandboxConfig::default(),
            agent: AgentConfig::default(),
            model: ModelConfig::default(),
            store: StoreConfig::default(),
            log_level: "info".into(),
            tracing_sink_uri: None,
            tracing_experiment_name: None,
            tracing_autolog: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host:port the HTTP listener binds to.
    #[serde(default = "ServerConfig::default_bind_addr")]
    pub bind_addr: String,
}

impl ServerConfig {
    fn default_bind_addr() -> String {
        "0.0.0.0:8080".into()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    /// Path to the registry.json + CSV tree. Bind-mounted read-only into
    /// every sandbox provider.
    #[serde(default = "DatasetsConfig::default_dir")]
    pub datasets_dir: String,
}

impl DatasetsConfig {
    fn default_dir() -> String {
        "/data/datasets".into()
    }
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            datasets_dir: Self::default_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxProvider {
    Docker,
    K8s,
    Microsandbox,
}

impl Default for SandboxProvider {
    fn default() -> Self {
        SandboxProvider::Docker
    }
}

impl std::fmt::Display for SandboxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxProvider::Docker => write!(f, "docker"),
            SandboxProvider::K8s => write!(f, "k8s"),
            SandboxProvider::Microsandbox => write!(f, "microsandbox"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub provider: SandboxProvider,
    /// Container/job image holding the runner scripts.
    #[serde(default = "SandboxConfig::default_runner_image")]
    pub runner_image: String,
    #[serde(default = "SandboxConfig::default_run_timeout_seconds")]
    pub run_timeout_seconds: u32,
    #[serde(default = "SandboxConfig::default_max_rows")]
    pub max_rows: u32,
    #[serde(default = "SandboxConfig::default_max_output_bytes")]
    pub max_output_bytes: u32,
    #[serde(default = "default_true")]
    pub enable_python_execution: bool,
    #[serde(default)]
    pub k8s: K8sConfig,
    #[serde(default)]
    pub microsandbox: MicrosandboxConfig,
}

impl SandboxConfig {
    fn default_runner_image() -> String {
        "analyst-runner:latest".into()
    }
    fn default_run_timeout_seconds() -> u32 {
        30
    }
    fn default_max_rows() -> u32 {
        200
    }
    fn default_max_output_bytes() -> u32 {
        200_000
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProvider::default(),
            runner_image: Self::default_runner_image(),
            run_timeout_seconds: Self::default_run_timeout_seconds(),
            max_rows: Self::default_max_rows(),
            max_output_bytes: Self::default_max_output_bytes(),
            enable_python_execution: true,
            k8s: K8sConfig::default(),
            microsandbox: MicrosandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sConfig {
    #[serde(default = "K8sConfig::default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default = "K8sConfig::default_image_pull_policy")]
    pub image_pull_policy: String,
    #[serde(default = "K8sConfig::default_cpu_limit")]
    pub cpu_limit: String,
    #[serde(default = "K8sConfig::default_memory_limit")]
    pub memory_limit: String,
    #[serde(default)]
    pub dataset_pvc: Option<String>,
    #[serde(default = "K8sConfig::default_job_ttl_seconds")]
    pub job_ttl_seconds: u32,
    #[serde(default = "K8sConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl K8sConfig {
    fn default_namespace() -> String {
        "default".into()
    }
    fn default_image_pull_policy() -> String {
        "IfNotPresent".into()
    }
    fn default_cpu_limit() -> String {
        "1".into()
    }
    fn default_memory_limit() -> String {
        "1Gi".into()
    }
    fn default_job_ttl_seconds() -> u32 {
        300
    }
    fn default_poll_interval_ms() -> u64 {
        500
    }
}

impl Default for K8sConfig {
    fn default() -> Self {
        Self {
            namespace: Self::default_namespace(),
            service_account: None,
            image_pull_policy: Self::default_image_pull_policy(),
            cpu_limit: Self::default_cpu_limit(),
            memory_limit: Self::default_memory_limit(),
            dataset_pvc: None,
            job_ttl_seconds: Self::default_job_ttl_seconds(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrosandboxConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "MicrosandboxConfig::default_memory_mb")]
    pub memory_mb: u32,
    #[serde(default = "MicrosandboxConfig::default_cpu")]
    pub cpu: f32,
}

impl MicrosandboxConfig {
    fn default_memory_mb() -> u32 {
        512
    }
    fn default_cpu() -> f32 {
        1.0
    }
}

impl Default for MicrosandboxConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            namespace: None,
            memory_mb: Self::default_memory_mb(),
            cpu: Self::default_cpu(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Number of reason-act rounds allowed before AGENT_RECURSION_LIMIT.
    #[serde(default = "AgentConfig::default_max_rounds")]
    pub max_rounds: u32,
    /// N for recent-history retrieval when building a turn's context.
    #[serde(default = "AgentConfig::default_thread_history_window")]
    pub thread_history_window: usize,
}

impl AgentConfig {
    fn default_max_rounds() -> u32 {
        25
    }
    fn default_thread_history_window() -> usize {
        20
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: Self::default_max_rounds(),
            thread_history_window: Self::default_thread_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "anthropic" | "openai" | "mock"
    #[serde(default = "ModelConfig::default_provider")]
    pub provider: String,
    #[serde(default = "ModelConfig::default_name")]
    pub name: String,
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub driver_options: serde_json::Value,
    pub mock_responses_file: Option<String>,
}

impl ModelConfig {
    fn default_provider() -> String {
        "anthropic".into()
    }
    fn default_name() -> String {
        "claude-sonnet-4-5".into()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            name: Self::default_name(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            driver_options: serde_json::Value::Null,
            mock_responses_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file holding run_capsules and thread_messages.
    #[serde(default = "StoreConfig::default_path")]
    pub sqlite_path: String,
}

impl StoreConfig {
    fn default_path() -> String {
        "analyst.sqlite3".into()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Self::default_path(),
        }
    }
}

/// Named provider overrides, parallel to sven-config's `providers` map —
/// not currently consumed by the loader but kept for config-file parity
/// with deployments that carry multiple named model endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedProviders(pub HashMap<String, ModelConfig>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_sandbox_provider_is_docker() {
        let c = Config::default();
        assert_eq!(c.sandbox.provider, SandboxProvider::Docker);
    }

    #[test]
    fn config_default_python_execution_enabled() {
        let c = Config::default();
        assert!(c.sandbox.enable_python_execution);
    }

    #[test]
    fn config_default_run_timeout_in_spec_range() {
        let c = Config::default();
        assert!(c.sandbox.run_timeout_seconds >= 1 && c.sandbox.run_timeout_seconds <= 60);
    }

    #[test]
    fn config_default_max_rows_in_spec_range() {
        let c = Config::default();
        assert!(c.sandbox.max_rows >= 1 && c.sandbox.max_rows <= 1000);
    }

    #[test]
    fn sandbox_provider_display_matches_env_tokens() {
        assert_eq!(SandboxProvider::Docker.to_string(), "docker");
        assert_eq!(SandboxProvider::K8s.to_string(), "k8s");
        assert_eq!(SandboxProvider::Microsandbox.to_string(), "microsandbox");
    }

    #[test]
    fn config_yaml_round_trip() {
        let c = Config::default();
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.sandbox.runner_image, c.sandbox.runner_image);
    }

    #[test]
    fn config_partial_yaml_fills_defaults() {
        let yaml = "sandbox:\n  provider: k8s\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.sandbox.provider, SandboxProvider::K8s);
        assert_eq!(c.sandbox.max_rows, SandboxConfig::default_max_rows());
    }
}
