use clap::Parser;

/// Conversational data-analysis agent: NL question in, SQL/plan/Python run
/// in a sandbox, capsule out.
#[derive(Debug, Parser)]
#[command(name = "analyst-agent", version, about)]
pub struct Cli {
    /// Path to a YAML config file layered under environment overrides.
    #[arg(long, env = "ANALYST_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Bind port for the HTTP server (overrides `ANALYST_SERVER_BIND_ADDR`'s port).
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory containing the dataset registry and data files.
    #[arg(long)]
    pub datasets_dir: Option<String>,

    /// Tracing subscriber filter, e.g. "info" or "analyst_core=debug,info".
    #[arg(long)]
    pub log_level: Option<String>,

    /// Sandbox executor backend: "docker", "k8s", or "microsandbox".
    #[arg(long)]
    pub sandbox_provider: Option<String>,
}
