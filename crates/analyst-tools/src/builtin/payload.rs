use analyst_config::SandboxConfig;
use analyst_datasets::DatasetDescriptor;
use analyst_sandbox::{QueryType, RunnerFile, RunnerPayload};

/// Every sandbox provider bind-mounts the datasets root read-only at
/// `/data`, so a file's runner-visible path is always `/data/<relative>`.
pub(crate) fn runner_files(ds: &DatasetDescriptor) -> Vec<RunnerFile> {
    ds.files
        .iter()
        .map(|f| RunnerFile {
            name: f.name.clone(),
            path: format!("/data/{}", f.path),
        })
        .collect()
}

pub(crate) fn base_payload(
    cfg: &SandboxConfig,
    ds: &DatasetDescriptor,
    query_type: QueryType,
) -> RunnerPayload {
    RunnerPayload {
        dataset_id: ds.id.clone(),
        files: runner_files(ds),
        query_type,
        timeout_seconds: cfg.run_timeout_seconds,
        max_rows: cfg.max_rows,
        max_output_bytes: cfg.max_output_bytes,
        sql: None,
        python_code: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_datasets::DatasetFile;
    use std::collections::HashMap;

    #[test]
    fn runner_files_prefixes_with_data() {
        let ds = DatasetDescriptor {
            id: "ecommerce".into(),
            name: "E-commerce".into(),
            description: None,
            suggested_prompts: vec![],
            content_hash: None,
            files: vec![DatasetFile {
                name: "orders.csv".into(),
                path: "ecommerce/orders.csv".into(),
                schema: HashMap::new(),
            }],
        };
        let files = runner_files(&ds);
        assert_eq!(files[0].path, "/data/ecommerce/orders.csv");
    }
}
