mod builtin;
mod envelope;
mod registry;
mod tool;

pub use builtin::{
    ExecutePythonTool, ExecuteQueryPlanTool, ExecuteSqlTool, GetDatasetSchemaTool,
    ListDatasetsTool, EXECUTION_TOOL_NAMES,
};
pub use envelope::ExecutionEnvelope;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolOutput};

use std::sync::Arc;

use analyst_config::SandboxConfig;
use analyst_datasets::Registry;
use analyst_sandbox::Executor;

/// Builds the full tool surface for a running service, wired against a
/// loaded dataset registry and a chosen sandbox executor.
pub fn build_registry(
    datasets: Arc<Registry>,
    executor: Arc<dyn Executor>,
    sandbox: SandboxConfig,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ListDatasetsTool::new(datasets.clone()));
    registry.register(GetDatasetSchemaTool::new(datasets.clone()));
    registry.register(ExecuteSqlTool::new(
        datasets.clone(),
        executor.clone(),
        sandbox.clone(),
    ));
    registry.register(ExecuteQueryPlanTool::new(
        datasets.clone(),
        executor.clone(),
        sandbox.clone(),
    ));
    registry.register(ExecutePythonTool::new(datasets, executor, sandbox));
    registry
}
