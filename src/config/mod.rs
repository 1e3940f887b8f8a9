mod file_config;

pub use file_config::FileConfig;

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that take part in config resolution. Mirrors the subset of
/// the CLI that the TOML config can override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub data_roots: Vec<PathBuf>,
    pub watch: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub data_roots: Vec<PathBuf>,
    pub watch: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from("kinoteka.db"));

        let data_roots: Vec<PathBuf> = file
            .data_roots
            .map(|roots| roots.into_iter().map(PathBuf::from).collect())
            .unwrap_or_else(|| cli.data_roots.clone());

        if data_roots.is_empty() {
            bail!("no data roots configured; pass --root or set data_roots in the config file");
        }
        for root in &data_roots {
            if !root.is_dir() {
                bail!("data root is not a directory: {:?}", root);
            }
        }

        let watch = file.watch.unwrap_or(cli.watch);

        Ok(AppConfig {
            db_path,
            data_roots,
            watch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_roots() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("no data roots configured"));
    }

    #[test]
    fn test_file_overrides_cli() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliConfig {
            db_path: Some(PathBuf::from("cli.db")),
            data_roots: vec![PathBuf::from("/nonexistent")],
            watch: true,
        };
        let file = FileConfig {
            db_path: Some("file.db".to_string()),
            data_roots: Some(vec![dir.path().to_string_lossy().into_owned()]),
            watch: Some(false),
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("file.db"));
        assert_eq!(config.data_roots, vec![dir.path().to_path_buf()]);
        assert!(!config.watch);
    }

    #[test]
    fn test_missing_root_rejected() {
        let cli = CliConfig {
            db_path: None,
            data_roots: vec![PathBuf::from("/definitely/not/here")],
            watch: true,
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("kinoteka.toml");
        std::fs::write(
            &config_path,
            format!(
                "db_path = \"catalog.db\"\ndata_roots = [\"{}\"]\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let file = FileConfig::load(&config_path).unwrap();
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("catalog.db"));
        assert_eq!(config.data_roots.len(), 1);
    }
}
