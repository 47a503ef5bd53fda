//! Configuration management for stockroom
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Staging sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Feed download configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Configured upstream suppliers
    #[serde(default)]
    pub suppliers: Vec<SupplierConfig>,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Staging sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records staged per transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Feed download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// One upstream supplier feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierConfig {
    /// Supplier name, stored in every source column
    pub name: String,

    /// Feed URL to download from
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Local feed file, preferred over the URL when it exists
    #[serde(default)]
    pub feed_path: Option<PathBuf>,

    /// Disabled suppliers are skipped by sync
    #[serde(default = "default_supplier_enabled")]
    pub enabled: bool,

    /// Attribute name carrying the pack quantity, if any
    #[serde(default)]
    pub pack_attribute: Option<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for stockroom data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            fetch: FetchConfig::default(),
            suppliers: Vec::new(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Get the default base directory for stockroom (~/.stockroom)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stockroom")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("stockroom.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Paths derive from the config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("stockroom.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if stockroom is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Look up a supplier by name
    pub fn supplier(&self, name: &str) -> Result<&SupplierConfig> {
        self.suppliers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SupplierNotFound(name.to_string()))
    }

    /// All suppliers with `enabled = true`
    pub fn enabled_suppliers(&self) -> Vec<&SupplierConfig> {
        self.suppliers.iter().filter(|s| s.enabled).collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be >= 1".to_string()));
        }

        if self.fetch.connect_timeout_secs == 0 || self.fetch.request_timeout_secs == 0 {
            return Err(Error::Config(
                "fetch timeouts must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for supplier in &self.suppliers {
            if supplier.name.trim().is_empty() {
                return Err(Error::Config("supplier name must not be empty".to_string()));
            }
            if !names.insert(supplier.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate supplier name: {}",
                    supplier.name
                )));
            }
            if supplier.feed_url.is_none() && supplier.feed_path.is_none() {
                return Err(Error::Config(format!(
                    "supplier '{}' needs feed_url or feed_path",
                    supplier.name
                )));
            }
        }

        Ok(())
    }
}
