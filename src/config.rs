//! Engine configuration
//!
//! Loaded from `docsql.toml`. A `.env` file next to it is loaded first, then the
//! following environment variables override file settings:
//!
//! - `DOCSQL_DEFAULT_DATASOURCE` - datasource used by logins without one
//! - `DOCSQL_CURSOR_PREFIX` - prefix of positioned-update cursor names
//! - `DOCSQL_OMIT_NULL_UPDATE_COLUMNS` - `true`/`false`
//! - `DOCSQL_LOB_ENABLED` - `true`/`false`

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "docsql.toml";

/// Environment variable names
pub const ENV_DEFAULT_DATASOURCE: &str = "DOCSQL_DEFAULT_DATASOURCE";
pub const ENV_CURSOR_PREFIX: &str = "DOCSQL_CURSOR_PREFIX";
pub const ENV_OMIT_NULL_UPDATE_COLUMNS: &str = "DOCSQL_OMIT_NULL_UPDATE_COLUMNS";
pub const ENV_LOB_ENABLED: &str = "DOCSQL_LOB_ENABLED";

/// Plan compilation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Datasource for logins that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_datasource: Option<String>,
    /// UPDATE statements leave out SET columns whose value is NULL
    #[serde(default = "default_true")]
    pub omit_null_update_columns: bool,
    #[serde(default = "default_cursor_prefix")]
    pub cursor_prefix: String,
    #[serde(default = "default_cache_capacity")]
    pub metadata_cache_capacity: usize,
    #[serde(default)]
    pub lob: LobConfig,
}

/// Vendor large-object handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobConfig {
    /// When false, LOB columns are bound like any other column
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Physical row identity pseudo column used to locate rows for the LOB fill
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,
}

fn default_true() -> bool {
    true
}

fn default_cursor_prefix() -> String {
    "DOCSQL_CUR".to_string()
}

fn default_cache_capacity() -> usize {
    256
}

fn default_row_id_column() -> String {
    "ROWID".to_string()
}

impl Default for LobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            row_id_column: default_row_id_column(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_datasource: None,
            omit_null_update_columns: true,
            cursor_prefix: default_cursor_prefix(),
            metadata_cache_capacity: default_cache_capacity(),
            lob: LobConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a directory
    ///
    /// This also loads any `.env` file in the directory and applies
    /// environment variable overrides.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            anyhow::bail!("Configuration file not found: {}", config_path.display());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        tracing::debug!("Loaded engine configuration from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE_NAME), content)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(datasource) = lookup(ENV_DEFAULT_DATASOURCE) {
            if !datasource.is_empty() {
                self.default_datasource = Some(datasource);
            }
        }

        if let Some(prefix) = lookup(ENV_CURSOR_PREFIX) {
            if !prefix.is_empty() {
                self.cursor_prefix = prefix;
            }
        }

        if let Some(omit) = lookup(ENV_OMIT_NULL_UPDATE_COLUMNS) {
            if let Ok(omit) = omit.parse::<bool>() {
                self.omit_null_update_columns = omit;
            }
        }

        if let Some(enabled) = lookup(ENV_LOB_ENABLED) {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.lob.enabled = enabled;
            }
        }
    }
}
