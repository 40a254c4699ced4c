//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STRATA_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{CollectionKind, JournalConfig};
use strata_segment::{FileBackend, MmapBackend, StorageBackend};

/// Largest accepted journal segment size in kilobytes (1 TiB).
pub const MAX_JOURNAL_SIZE_KB: u64 = 1024 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Garbage collector configuration.
    pub gc: GcConfig,
    /// Collections opened at startup.
    pub collections: Vec<CollectionConfig>,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("STRATA_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.storage.apply_env_overrides();
        self.gc.apply_env_overrides();

        // Comma-separated document collections, added to those from the file.
        if let Ok(names) = std::env::var("STRATA_COLLECTIONS") {
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if !self.collections.iter().any(|c| c.name == name) {
                    self.collections.push(CollectionConfig {
                        name: name.to_string(),
                        kind: CollectionKind::Document,
                    });
                }
            }
        }
    }

    /// Checks sizes, intervals, and collection names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.journal_size_kb == 0 {
            return Err(ConfigError::ValidationError(
                "storage.journal_size_kb must be greater than 0".to_string(),
            ));
        }
        if self.storage.journal_size_kb > MAX_JOURNAL_SIZE_KB {
            return Err(ConfigError::ValidationError(format!(
                "storage.journal_size_kb must be at most {} (1 TiB), got {}",
                MAX_JOURNAL_SIZE_KB, self.storage.journal_size_kb
            )));
        }
        if self.gc.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "gc.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty()
                || collection.name.contains(['/', '\\'])
                || collection.name == "."
                || collection.name == ".."
            {
                return Err(ConfigError::ValidationError(format!(
                    "invalid collection name '{}'",
                    collection.name
                )));
            }
            if !seen.insert(collection.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate collection '{}'",
                    collection.name
                )));
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// How journal regions are backed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Preallocated files written with positioned writes.
    File,
    /// Memory-mapped files.
    #[default]
    Mmap,
}

impl BackendKind {
    /// Returns the storage backend for this kind.
    pub fn backend(self) -> Arc<dyn StorageBackend> {
        match self {
            BackendKind::File => Arc::new(FileBackend),
            BackendKind::Mmap => Arc::new(MmapBackend),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Mmap => "mmap",
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Journal segment size in kilobytes.
    pub journal_size_kb: u64,
    /// Region backend.
    pub backend: BackendKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            journal_size_kb: 32 * 1024,
            backend: BackendKind::Mmap,
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("STRATA_DATA") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(size) = std::env::var("STRATA_JOURNAL_SIZE_KB") {
            if let Ok(kb) = size.parse() {
                self.journal_size_kb = kb;
            }
        }

        if let Ok(backend) = std::env::var("STRATA_BACKEND") {
            match backend.to_lowercase().as_str() {
                "file" => self.backend = BackendKind::File,
                "mmap" => self.backend = BackendKind::Mmap,
                other => tracing::warn!("Ignoring unknown STRATA_BACKEND '{}'", other),
            }
        }
    }

    /// Returns the journal segment size in bytes.
    ///
    /// Saturates for sizes [`Config::validate`] rejects.
    pub fn journal_size(&self) -> u64 {
        self.journal_size_kb.saturating_mul(1024)
    }

    /// Returns the directory holding a collection's journals.
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join("collections").join(name)
    }

    /// Returns the journal configuration for a collection.
    pub fn journal_config(&self, name: &str) -> JournalConfig {
        JournalConfig::new(self.collection_dir(name)).with_capacity(self.journal_size())
    }
}

/// Garbage collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Sleep between collector ticks in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
        }
    }
}

impl GcConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(interval) = std::env::var("STRATA_GC_POLL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }
    }

    /// Returns the poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A collection to open at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub kind: CollectionKind,
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.journal_size(), 32 * 1024 * 1024);
        assert_eq!(config.storage.backend, BackendKind::Mmap);
        assert_eq!(config.gc.poll_interval(), Duration::from_millis(1));
        assert!(config.collections.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.collection_dir("users"),
            PathBuf::from("./data/collections/users")
        );
        let journal = storage.journal_config("users");
        assert_eq!(journal.capacity, 32 * 1024 * 1024);
        assert_eq!(journal.dir, PathBuf::from("./data/collections/users"));
    }

    #[test]
    fn test_parse_yaml() {
        let config = Config::from_yaml(
            r#"
storage:
  data_dir: /var/lib/strata
  journal_size_kb: 64
  backend: file
gc:
  poll_interval_ms: 5
collections:
  - name: users
  - name: _shapes
    kind: shape
"#,
        )
        .unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/strata"));
        assert_eq!(config.storage.journal_size(), 64 * 1024);
        assert_eq!(config.storage.backend, BackendKind::File);
        assert_eq!(config.gc.poll_interval_ms, 5);
        assert_eq!(config.collections[0].kind, CollectionKind::Document);
        assert_eq!(config.collections[1].kind, CollectionKind::Shape);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.storage.journal_size_kb = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.gc.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let config = Config::from_yaml("storage: {journal_size_kb: 18446744073709551615}").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("journal_size_kb must be at most"));
        assert_eq!(config.storage.journal_size(), u64::MAX);

        let mut config = Config::default();
        config.storage.journal_size_kb = MAX_JOURNAL_SIZE_KB;
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.journal_size(), 1 << 40);
        config.storage.journal_size_kb += 1;
        assert!(config.validate().is_err());

        let config = Config::from_yaml("collections: [{name: a}, {name: a, kind: shape}]").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate collection 'a'"));

        let config = Config::from_yaml("collections: [{name: ../etc}]").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");

        let mut config = Config::default();
        config.storage.backend = BackendKind::File;
        config.collections.push(CollectionConfig {
            name: "users".to_string(),
            kind: CollectionKind::Document,
        });
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.storage.backend, BackendKind::File);
        assert_eq!(loaded.collections, config.collections);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/strata.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_, _)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "gc: [not, a, map]").unwrap();

        match Config::from_file(&path) {
            Err(ConfigError::ParseError(p, _)) => assert_eq!(p, path),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
