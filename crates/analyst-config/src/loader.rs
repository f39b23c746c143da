use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones; environment variables
/// override all of them (see `load`). Unlike a developer CLI tool, this
/// service typically runs as a container image, so env vars are expected
/// to be the primary knob and YAML is the override layer for local dev.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/analyst-agent/config.yaml"));
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("analyst-agent/config.yaml"));
    }
    paths.push(PathBuf::from(".analyst-agent.yaml"));
    paths.push(PathBuf::from("analyst-agent.yaml"));
    paths
}

/// Load configuration: YAML layers merged in ascending priority, an
/// optional explicit path (highest YAML priority), then environment
/// variable overrides applied on top.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.parse().ok())
}

/// Apply the environment-variable surface named in the configuration
/// section of the system description. Every recognized option is mapped
/// here explicitly rather than through a derive macro, mirroring the
/// teacher's hand-written merge approach.
fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env("ANALYST_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = env("ANALYST_DATASETS_DIR") {
        config.datasets.datasets_dir = v;
    }
    if let Some(v) = env("ANALYST_SANDBOX_PROVIDER") {
        config.sandbox.provider = match v.to_lowercase().as_str() {
            "docker" => crate::SandboxProvider::Docker,
            "k8s" | "kubernetes" => crate::SandboxProvider::K8s,
            "microsandbox" => crate::SandboxProvider::Microsandbox,
            other => {
                tracing::warn!(value = other, "unknown ANALYST_SANDBOX_PROVIDER, ignoring");
                config.sandbox.provider
            }
        };
    }
    if let Some(v) = env("ANALYST_RUNNER_IMAGE") {
        config.sandbox.runner_image = v;
    }
    if let Some(v) = env_parse::<u32>("ANALYST_RUN_TIMEOUT_SECONDS") {
        config.sandbox.run_timeout_seconds = v;
    }
    if let Some(v) = env_parse::<u32>("ANALYST_MAX_ROWS") {
        config.sandbox.max_rows = v;
    }
    if let Some(v) = env_parse::<u32>("ANALYST_MAX_OUTPUT_BYTES") {
        config.sandbox.max_output_bytes = v;
    }
    if let Some(v) = env("ANALYST_ENABLE_PYTHON_EXECUTION") {
        config.sandbox.enable_python_execution = matches!(v.as_str(), "1" | "true" | "yes");
    }
    if let Some(v) = env("ANALYST_K8S_NAMESPACE") {
        config.sandbox.k8s.namespace = v;
    }
    if let Some(v) = env("ANALYST_K8S_SERVICE_ACCOUNT") {
        config.sandbox.k8s.service_account = Some(v);
    }
    if let Some(v) = env("ANALYST_K8S_IMAGE_PULL_POLICY") {
        config.sandbox.k8s.image_pull_policy = v;
    }
    if let Some(v) = env("ANALYST_K8S_CPU_LIMIT") {
        config.sandbox.k8s.cpu_limit = v;
    }
    if let Some(v) = env("ANALYST_K8S_MEMORY_LIMIT") {
        config.sandbox.k8s.memory_limit = v;
    }
    if let Some(v) = env("ANALYST_K8S_DATASET_PVC") {
        config.sandbox.k8s.dataset_pvc = Some(v);
    }
    if let Some(v) = env_parse::<u32>("ANALYST_K8S_JOB_TTL_SECONDS") {
        config.sandbox.k8s.job_ttl_seconds = v;
    }
    if let Some(v) = env_parse::<u64>("ANALYST_K8S_POLL_INTERVAL_MS") {
        config.sandbox.k8s.poll_interval_ms = v;
    }
    if let Some(v) = env("ANALYST_MICROSANDBOX_SERVER_URL") {
        config.sandbox.microsandbox.server_url = Some(v);
    }
    if let Some(v) = env("ANALYST_MICROSANDBOX_API_KEY") {
        config.sandbox.microsandbox.api_key = Some(v);
    }
    if let Some(v) = env("ANALYST_MICROSANDBOX_NAMESPACE") {
        config.sandbox.microsandbox.namespace = Some(v);
    }
    if let Some(v) = env_parse::<u32>("ANALYST_MICROSANDBOX_MEMORY_MB") {
        config.sandbox.microsandbox.memory_mb = v;
    }
    if let Some(v) = env_parse::<f32>("ANALYST_MICROSANDBOX_CPU") {
        config.sandbox.microsandbox.cpu = v;
    }
    if let Some(v) = env_parse::<usize>("ANALYST_THREAD_HISTORY_WINDOW") {
        config.agent.thread_history_window = v;
    }
    if let Some(v) = env_parse::<u32>("ANALYST_AGENT_MAX_ROUNDS") {
        config.agent.max_rounds = v;
    }
    if let Some(v) = env("ANALYST_MODEL_PROVIDER") {
        config.model.provider = v;
    }
    if let Some(v) = env("ANALYST_MODEL_NAME") {
        config.model.name = v;
    }
    if let Some(v) = env("ANALYST_MODEL_API_KEY") {
        config.model.api_key = Some(v);
    }
    if let Some(v) = env("ANALYST_MODEL_BASE_URL") {
        config.model.base_url = Some(v);
    }
    if let Some(v) = env("ANALYST_STORE_SQLITE_PATH") {
        config.store.sqlite_path = v;
    }
    if let Some(v) = env("ANALYST_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Some(v) = env("ANALYST_TRACING_SINK_URI") {
        config.tracing_sink_uri = Some(v);
    }
    if let Some(v) = env("ANALYST_TRACING_EXPERIMENT_NAME") {
        config.tracing_experiment_name = Some(v);
    }
    if let Some(v) = env("ANALYST_TRACING_AUTOLOG") {
        config.tracing_autolog = matches!(v.as_str(), "1" | "true" | "yes");
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("sandbox:\n  provider: docker\n  max_rows: 50");
        let src = val("sandbox:\n  max_rows: 900");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["sandbox"]["provider"].as_str(), Some("docker"));
        assert_eq!(dst["sandbox"]["max_rows"].as_i64(), Some(900));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/analyst_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.sandbox.provider, crate::SandboxProvider::Docker);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "sandbox:\n  provider: k8s\n  runner_image: custom:latest").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.sandbox.provider, crate::SandboxProvider::K8s);
        assert_eq!(cfg.sandbox.runner_image, "custom:latest");
    }

    #[test]
    fn env_override_wins_over_yaml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "sandbox:\n  provider: docker").unwrap();
        std::env::set_var("ANALYST_SANDBOX_PROVIDER", "k8s");
        let cfg = load(Some(f.path())).unwrap();
        std::env::remove_var("ANALYST_SANDBOX_PROVIDER");
        assert_eq!(cfg.sandbox.provider, crate::SandboxProvider::K8s);
    }
}
