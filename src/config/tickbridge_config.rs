//! tickbridge configuration file handling
//!
//! Loads and manages the ~/.config/tickbridge/config.yaml file.

use super::credential_group::CredentialGroup;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which cache backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// SQLite file, survives across runs
    #[default]
    Sqlite,
    /// Process memory only
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    /// SQLite database path
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn config_dir() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("tickbridge");
    path
}

fn default_cache_path() -> PathBuf {
    config_dir().join("cache.db")
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            path: default_cache_path(),
        }
    }
}

/// tickbridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickBridgeConfig {
    /// Credential groups (one cache entry each)
    #[serde(default)]
    pub groups: Vec<CredentialGroup>,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheSettings,
}

impl TickBridgeConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/tickbridge/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::TickBridgeError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading tickbridge configuration");

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        tracing::debug!(
            groups = config.groups.len(),
            backend = ?config.cache.backend,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving tickbridge configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/tickbridge/config.yaml)
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yaml")
    }

    /// Get a group by id
    pub fn get_group(&self, id: &str) -> Option<&CredentialGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Get a group by id, failing with `GroupNotFound`
    pub fn require_group(&self, id: &str) -> Result<&CredentialGroup> {
        self.get_group(id)
            .ok_or_else(|| crate::TickBridgeError::GroupNotFound(id.to_string()))
    }

    /// Add a group
    pub fn add_group(&mut self, group: CredentialGroup) {
        self.groups.push(group);
    }

    /// All group ids in file order
    pub fn group_ids(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssociationSettings, GitHubSettings, ZendeskSettings};
    use tempfile::NamedTempFile;

    fn group(id: &str) -> CredentialGroup {
        CredentialGroup::new(
            id,
            GitHubSettings::new("acme", "app"),
            ZendeskSettings::new("acme", "agent@acme.test"),
            AssociationSettings::new(360001),
        )
    }

    #[test]
    fn test_config_creation() {
        let config = TickBridgeConfig::new();
        assert!(config.groups.is_empty());
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert!(config.cache.path.ends_with("tickbridge/cache.db"));
    }

    #[test]
    fn test_get_group() {
        let mut config = TickBridgeConfig::new();
        config.add_group(group("acme"));
        config.add_group(group("globex"));

        assert_eq!(config.group_ids(), vec!["acme", "globex"]);
        assert!(config.get_group("globex").is_some());
        assert!(config.get_group("initech").is_none());
        assert!(matches!(
            config.require_group("initech"),
            Err(crate::TickBridgeError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();

        let mut config = TickBridgeConfig::new();
        config.add_group(group("acme").with_utc_offset(-5));
        config.cache.backend = CacheBackend::Memory;
        config.save(temp_file.path()).unwrap();

        let loaded = TickBridgeConfig::load(temp_file.path()).unwrap();
        assert_eq!(loaded.groups.len(), 1);
        assert_eq!(loaded.groups[0].id, "acme");
        assert_eq!(loaded.groups[0].utc_offset, -5);
        assert_eq!(loaded.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn test_load_missing_file() {
        let result = TickBridgeConfig::load("/nonexistent/tickbridge.yaml");
        assert!(matches!(result, Err(crate::TickBridgeError::Config(_))));
    }

    #[test]
    fn test_load_invalid_yaml_names_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "groups: [unterminated").unwrap();

        let err = TickBridgeConfig::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, crate::TickBridgeError::Anyhow(_)));

        let message = err.to_string();
        assert!(message.starts_with("Failed to parse config file"));
        assert!(message.contains(&temp_file.path().display().to_string()));
    }

    #[test]
    fn test_default_path() {
        assert!(TickBridgeConfig::default_path().ends_with("tickbridge/config.yaml"));
    }
}
