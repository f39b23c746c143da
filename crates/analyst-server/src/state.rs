use std::sync::Arc;

use analyst_config::{AgentConfig, SandboxConfig};
use analyst_core::Session;
use analyst_datasets::Registry;
use analyst_model::ModelProvider;
use analyst_store::{CapsuleStore, MessageStore};
use analyst_tools::ToolRegistry;

/// Shared services every request handler needs, aggregated the way the
/// HTTP layer this crate is grounded on bundles its own `AppState`: one
/// `Clone`-able struct of `Arc`-wrapped singletons passed through
/// `Router::with_state`.
#[derive(Clone)]
pub struct AppState {
    pub datasets: Arc<Registry>,
    pub tools: Arc<ToolRegistry>,
    pub model: Arc<dyn ModelProvider>,
    pub capsules: Arc<dyn CapsuleStore>,
    pub messages: Arc<dyn MessageStore>,
    pub sandbox: SandboxConfig,
    pub agent: AgentConfig,
}

impl AppState {
    /// Approximate model context budget new sessions are seeded with.
    /// Not configurable per the current configuration surface; generous
    /// enough that a turn's own history window never trips it.
    pub fn new_session(&self) -> Session {
        Session::new(200_000)
    }
}
