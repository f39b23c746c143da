use std::collections::HashMap;

use serde::Serialize;

use crate::{registry::Registry, ColumnSchema};

const SAMPLE_ROW_COUNT: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct FileSchemaProjection {
    pub name: String,
    pub path: String,
    pub schema: HashMap<String, ColumnSchema>,
    pub sample_rows: Vec<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSchemaProjection {
    pub id: String,
    pub name: String,
    pub files: Vec<FileSchemaProjection>,
}

/// Build the per-file schema + sample-rows projection for a dataset,
/// reading up to `SAMPLE_ROW_COUNT` rows from each file's on-disk CSV.
/// Missing files are tolerated (empty sample), matching the registry's
/// "descriptor is metadata, file presence is not guaranteed" contract.
pub fn dataset_schema(registry: &Registry, dataset_id: &str) -> anyhow::Result<DatasetSchemaProjection> {
    let ds = registry.get(dataset_id)?;
    let mut files = Vec::with_capacity(ds.files.len());
    for f in &ds.files {
        let abs_path = registry.file_abs_path(&f.path);
        let sample_rows = if abs_path.is_file() {
            read_sample_rows(&abs_path, SAMPLE_ROW_COUNT).unwrap_or_default()
        } else {
            Vec::new()
        };
        files.push(FileSchemaProjection {
            name: f.name.clone(),
            path: f.path.clone(),
            schema: f.schema.clone(),
            sample_rows,
        });
    }
    Ok(DatasetSchemaProjection {
        id: ds.id.clone(),
        name: ds.name.clone(),
        files,
    })
}

fn read_sample_rows(
    path: &std::path::Path,
    limit: usize,
) -> anyhow::Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::with_capacity(limit);
    for record in reader.records().take(limit) {
        let record = record?;
        let mut row = HashMap::with_capacity(headers.len());
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), value.to_string());
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn setup(dir: &std::path::Path) -> Registry {
        std::fs::create_dir_all(dir.join("ecommerce")).unwrap();
        let mut f = std::fs::File::create(dir.join("ecommerce/orders.csv")).unwrap();
        writeln!(f, "order_id,total\n1,9.99\n2,19.99\n3,29.99\n4,39.99").unwrap();

        let mut reg = std::fs::File::create(dir.join("registry.json")).unwrap();
        reg.write_all(
            br#"{"datasets": [{"id": "ecommerce", "name": "E-commerce", "files": [
                {"name": "orders.csv", "path": "ecommerce/orders.csv", "schema": {
                    "order_id": {"type": "integer"}, "total": {"type": "float"}
                }}
            ]}]}"#,
        )
        .unwrap();
        Registry::load(dir).unwrap()
    }

    #[test]
    fn dataset_schema_reads_up_to_three_sample_rows() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path());
        let proj = dataset_schema(&registry, "ecommerce").unwrap();
        assert_eq!(proj.files.len(), 1);
        assert_eq!(proj.files[0].sample_rows.len(), 3);
        assert_eq!(proj.files[0].sample_rows[0]["order_id"], "1");
    }

    #[test]
    fn dataset_schema_missing_file_yields_empty_sample() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("registry.json"),
            br#"{"datasets": [{"id": "x", "name": "X", "files": [
                {"name": "missing.csv", "path": "x/missing.csv", "schema": {}}
            ]}]}"#,
        )
        .unwrap();
        let registry = Registry::load(dir.path()).unwrap();
        let proj = dataset_schema(&registry, "x").unwrap();
        assert!(proj.files[0].sample_rows.is_empty());
    }

    #[test]
    fn dataset_schema_unknown_dataset_errs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("registry.json"), br#"{"datasets": []}"#).unwrap();
        let registry = Registry::load(dir.path()).unwrap();
        assert!(dataset_schema(&registry, "nope").is_err());
    }
}
