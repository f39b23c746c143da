mod execute_python;
mod execute_query_plan;
mod execute_sql;
mod get_dataset_schema;
mod list_datasets;
mod payload;

pub use execute_python::ExecutePythonTool;
pub use execute_query_plan::ExecuteQueryPlanTool;
pub use execute_sql::ExecuteSqlTool;
pub use get_dataset_schema::GetDatasetSchemaTool;
pub use list_datasets::ListDatasetsTool;

/// Tool names whose output participates in capsule extraction — every
/// other tool (currently just `list_datasets`/`get_dataset_schema`) is
/// context-gathering and never becomes a run capsule.
pub const EXECUTION_TOOL_NAMES: [&str; 3] =
    ["execute_sql", "execute_query_plan", "execute_python"];
