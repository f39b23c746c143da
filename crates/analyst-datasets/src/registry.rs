use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::{DatasetDescriptor, DatasetRegistry};

/// Loads `registry.json` off `datasets_dir` and holds it read-only for the
/// process lifetime, per the "loaded at service start, immutable" contract.
#[derive(Debug, Clone)]
pub struct Registry {
    datasets_dir: PathBuf,
    registry: DatasetRegistry,
}

impl Registry {
    pub fn load(datasets_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let datasets_dir = datasets_dir.as_ref().to_path_buf();
        let registry_path = datasets_dir.join("registry.json");
        if !registry_path.is_file() {
            bail!("dataset registry not found: {}", registry_path.display());
        }
        let text = std::fs::read_to_string(&registry_path)
            .with_context(|| format!("reading {}", registry_path.display()))?;
        let registry: DatasetRegistry = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", registry_path.display()))?;
        Ok(Self {
            datasets_dir,
            registry,
        })
    }

    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }

    pub fn list(&self) -> &[DatasetDescriptor] {
        &self.registry.datasets
    }

    pub fn get(&self, dataset_id: &str) -> anyhow::Result<&DatasetDescriptor> {
        self.registry
            .datasets
            .iter()
            .find(|d| d.id == dataset_id)
            .with_context(|| format!("unknown dataset_id: {dataset_id}"))
    }

    /// Absolute path to a dataset file, for bind-mounting or sample reads.
    pub fn file_abs_path(&self, relative_path: &str) -> PathBuf {
        self.datasets_dir.join(relative_path)
    }
}
