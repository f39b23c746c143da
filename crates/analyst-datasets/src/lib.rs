mod registry;
mod schema;
mod types;

pub use registry::Registry;
pub use schema::{dataset_schema, DatasetSchemaProjection, FileSchemaProjection};
pub use types::*;
