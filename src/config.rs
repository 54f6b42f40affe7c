//! Configuration management for deployment sessions
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (deploy.toml)
//! - Environment variables (DEPLOY__*)
//!
//! ## Example config file (deploy.toml):
//! ```toml
//! [session]
//! network = "mainnet"
//! system_salt = "bao"
//! autosave = true
//!
//! [storage]
//! backend = "json"
//! directory = "./deployments"
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::{JsonFileBackend, MemoryBackend, StoreBackend};

/// Main configuration for deployment sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Network the deployment targets
    #[serde(default = "default_network")]
    pub network: String,

    /// System salt; namespaces every deterministic address
    #[serde(default = "default_system_salt")]
    pub system_salt: String,

    /// Persist after every mutating call
    #[serde(default = "default_true")]
    pub autosave: bool,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    Memory,
    #[default]
    Json,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendChoice,

    /// Directory holding `<network>/<system_salt>.json` documents
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

// Default value functions
fn default_network() -> String {
    "local".to_string()
}

fn default_system_salt() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("deployments")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            system_salt: default_system_salt(),
            autosave: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::default(),
            directory: default_directory(),
            format: OutputFormat::default(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["deploy.toml", ".deploy.toml", "config/deploy.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "deploy-ledger") {
            let xdg_config = config_dir.config_dir().join("deploy.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (DEPLOY__SESSION__NETWORK, ...)
        builder = builder.add_source(
            Environment::with_prefix("DEPLOY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Path of the document for a (network, system salt) pair
    pub fn document_path(&self, network: &str, system_salt: &str) -> PathBuf {
        self.storage
            .directory
            .join(network)
            .join(format!("{}.json", system_salt))
    }

    /// Backend for the configured session
    pub fn backend(&self) -> Box<dyn StoreBackend> {
        match self.storage.backend {
            BackendChoice::Memory => Box::new(MemoryBackend::new()),
            BackendChoice::Json => Box::new(
                JsonFileBackend::new(
                    self.document_path(&self.session.network, &self.session.system_salt),
                )
                .with_format(self.storage.format),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BackendKind;

    #[test]
    fn test_default_config() {
        let config = DeployConfig::default();
        assert!(config.session.autosave);
        assert_eq!(config.storage.backend, BackendChoice::Json);
        assert_eq!(config.storage.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_serialize_config() {
        let config = DeployConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[session]\nnetwork = \"sepolia\"\nsystem_salt = \"bao-v2\"\nautosave = false\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = DeployConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.session.network, "sepolia");
        assert_eq!(config.session.system_salt, "bao-v2");
        assert!(!config.session.autosave);
        assert_eq!(config.backend().kind(), BackendKind::Memory);
    }

    #[test]
    fn test_document_path() {
        let config = DeployConfig::default();
        let path = config.document_path("mainnet", "bao");
        assert!(path.ends_with("mainnet/bao.json"));
    }
}
