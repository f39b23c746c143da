mod agent;
mod capsule;
mod events;
mod prompts;
mod session;
mod types;

pub use agent::{recursion_limit_capsule, Agent, AgentTurnError, RECURSION_LIMIT_MESSAGE};
pub use capsule::extract_capsule;
pub use events::AgentEvent;
pub use prompts::{dataset_schema_fragment, prior_run_fragment, role_and_mandate_fragment};
pub use session::Session;
pub use types::{MessageRole, QueryMode, RunCapsule, RunStatus, ThreadMessage};
