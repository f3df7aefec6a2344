use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "./property_catalog.sqlite3";

/// File-level configuration shared by the `pcat` CLI and the HTTP service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub db_path: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Fail runs whose release is not newer than the artifact's last processed release.
    pub enforce_release_order: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { enforce_release_order: true }
    }
}

impl CatalogConfig {
    /// Read a YAML configuration file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// # Errors
    /// Returns an error when the YAML is malformed or carries unknown keys.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("invalid catalog configuration")
    }

    /// Load the file when one is given, otherwise fall back to defaults.
    ///
    /// # Errors
    /// Returns an error when a given file cannot be loaded.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Database path with precedence flag, then file, then [`DEFAULT_DB_PATH`].
    #[must_use]
    pub fn resolve_db_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}
