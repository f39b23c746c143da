use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single column's schema record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default, rename = "enumerated_values")]
    pub enumerated_values: Option<Vec<String>>,
}

/// One file belonging to a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub name: String,
    /// Relative path under the datasets root.
    pub path: String,
    #[serde(default)]
    pub schema: HashMap<String, ColumnSchema>,
}

impl DatasetFile {
    /// The derived table name: the filename with its extension removed.
    pub fn table_name(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((stem, _ext)) => stem.to_string(),
            None => self.name.clone(),
        }
    }
}

/// A dataset descriptor loaded from the registry. Immutable for the
/// process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggested_prompts: Vec<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    pub files: Vec<DatasetFile>,
}

impl DatasetDescriptor {
    pub fn file(&self, name: &str) -> Option<&DatasetFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn table(&self, table_name: &str) -> Option<&DatasetFile> {
        self.files.iter().find(|f| f.table_name() == table_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatasetRegistry {
    pub datasets: Vec<DatasetDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_strips_extension() {
        let f = DatasetFile {
            name: "orders.csv".into(),
            path: "ecommerce/orders.csv".into(),
            schema: HashMap::new(),
        };
        assert_eq!(f.table_name(), "orders");
    }

    #[test]
    fn table_name_without_extension_is_unchanged() {
        let f = DatasetFile {
            name: "orders".into(),
            path: "ecommerce/orders".into(),
            schema: HashMap::new(),
        };
        assert_eq!(f.table_name(), "orders");
    }
}
