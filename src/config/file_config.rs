use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Path to the SQLite catalog database file.
    pub db_path: Option<String>,

    /// Data root directories, in priority order. Stored items reference
    /// their root by index into this list, so reordering it re-homes items.
    pub data_roots: Option<Vec<String>>,

    /// Whether to keep watching the roots after the startup pass.
    pub watch: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
