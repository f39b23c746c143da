mod compiler;
mod plan;
mod policy;

pub use compiler::{CompilationError, QueryPlanCompiler};
pub use plan::{
    Aggregation, AggregationFunction, Filter, FilterOperator, FilterValue, OrderBy, PlanError,
    QueryPlan, SelectColumn, SelectItem, SortDirection,
};
pub use policy::{normalize_sql_for_dataset, validate_sql_policy};
