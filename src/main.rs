mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use analyst_config::SandboxProvider;
use analyst_datasets::Registry;
use analyst_server::AppState;
use analyst_store::{SqliteCapsuleStore, SqliteMessageStore};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = analyst_config::load(cli.config.as_deref())
        .context("loading configuration")?;

    if let Some(port) = cli.port {
        let host = config
            .server
            .bind_addr
            .rsplit_once(':')
            .map(|(h, _)| h.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.bind_addr = format!("{host}:{port}");
    }
    if let Some(dir) = cli.datasets_dir {
        config.datasets.datasets_dir = dir;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(provider) = &cli.sandbox_provider {
        config.sandbox.provider = match provider.to_lowercase().as_str() {
            "docker" => SandboxProvider::Docker,
            "k8s" | "kubernetes" => SandboxProvider::K8s,
            "microsandbox" => SandboxProvider::Microsandbox,
            other => anyhow::bail!("unknown sandbox provider: {other}"),
        };
    }

    init_tracing(&config.log_level);

    tracing::info!(bind_addr = %config.server.bind_addr, "starting analyst-agent");

    let datasets = Arc::new(
        Registry::load(&config.datasets.datasets_dir).context("loading dataset registry")?,
    );
    let executor: Arc<dyn analyst_sandbox::Executor> = Arc::from(
        analyst_sandbox::from_config(&config.sandbox, &config.datasets.datasets_dir)
            .await
            .context("constructing sandbox executor")?,
    );
    let tools = Arc::new(analyst_tools::build_registry(
        Arc::clone(&datasets),
        Arc::clone(&executor),
        config.sandbox.clone(),
    ));
    let model = Arc::from(
        analyst_model::from_config(&config.model).context("constructing model provider")?,
    );
    let capsules = Arc::new(
        SqliteCapsuleStore::open(&config.store.sqlite_path).context("opening capsule store")?,
    );
    let messages = Arc::new(
        SqliteMessageStore::open(&config.store.sqlite_path).context("opening message store")?,
    );

    let state = AppState {
        datasets,
        tools,
        model,
        capsules,
        messages,
        sandbox: config.sandbox,
        agent: config.agent,
    };

    let router = analyst_server::build_router(state);
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind_addr: {}", config.server.bind_addr))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
