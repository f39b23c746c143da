mod fastpath;
pub mod http;
mod orchestrator;
mod state;
mod summarize;

pub use http::routes::build_router;
pub use orchestrator::{OrchestratorError, SessionOrchestrator};
pub use state::AppState;
