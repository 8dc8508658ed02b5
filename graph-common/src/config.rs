//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the data folder
pub const DATA_FOLDER_ENV: &str = "GRAPH_DATA_FOLDER";

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Relative paths resolve against the data folder
    pub database_file: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    /// Time budget for multi-row operations issued by scheduled jobs
    pub scheduled_timeout_ms: u64,
    /// Total time to keep retrying when SQLite reports a locked database
    pub max_lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_file: PathBuf::from("graph.db"),
            max_connections: 20,
            busy_timeout_ms: 5000,
            scheduled_timeout_ms: 10_000,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Schedule of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSchedule {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl JobSchedule {
    fn every(interval_secs: u64) -> Self {
        Self { enabled: true, interval_secs }
    }
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self::every(300)
    }
}

/// `[jobs]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub replace_subject_identifiers: JobSchedule,
    pub replace_linked_identifiers: JobSchedule,
    pub assign_internal_types: JobSchedule,
    pub merge_duplicates: JobSchedule,

    /// Transactions per commit call in the subject rewrite
    pub subject_commit_batch: usize,
    /// Transactions per commit call in the object relink
    pub link_commit_batch: usize,
    /// Committed batches per transaction log write
    pub log_batch: usize,
    pub subject_candidate_limit: usize,
    pub merge_candidate_limit: usize,
    pub merge_discovery_timeout_ms: u64,
    pub type_candidate_limit: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            replace_subject_identifiers: JobSchedule::every(60),
            replace_linked_identifiers: JobSchedule::every(60),
            assign_internal_types: JobSchedule::every(120),
            merge_duplicates: JobSchedule::every(600),
            subject_commit_batch: 50,
            link_commit_batch: 100,
            log_batch: 5,
            subject_candidate_limit: 5000,
            merge_candidate_limit: 10,
            merge_discovery_timeout_ms: 60_000,
            type_candidate_limit: 1000,
        }
    }
}

/// `[transformers]` section, feature toggles for pluggable transformers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformersConfig {
    pub replace_external_identifiers: bool,
    pub replace_anonymous_identifiers: bool,
    pub type_coercion: bool,
}

impl Default for TransformersConfig {
    fn default() -> Self {
        Self {
            replace_external_identifiers: true,
            replace_anonymous_identifiers: true,
            type_coercion: true,
        }
    }
}

/// `[events]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 7080 }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub data_folder: Option<PathBuf>,
    pub store: StoreConfig,
    pub jobs: JobsConfig,
    pub transformers: TransformersConfig,
    pub events: EventsConfig,
    pub server: ServerConfig,
}

impl GraphConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load from an explicit path, or the default location.
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_file() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            if explicit.is_some() {
                return Err(Error::Config(format!("Config file not found: {}", path.display())));
            }
            warn!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }

        debug!(path = %path.display(), "Loading config file");
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Database file location, relative paths resolved against the data folder
    pub fn database_path(&self, data_folder: &Path) -> PathBuf {
        if self.store.database_file.is_absolute() {
            self.store.database_file.clone()
        } else {
            data_folder.join(&self.store.database_file)
        }
    }
}

/// Data folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `data_folder` key of the config file
/// 4. OS-dependent default
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &GraphConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.data_folder {
        return path.clone();
    }

    default_data_folder()
}

/// `<config dir>/graph-core/config.toml`
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("graph-core").join("config.toml"))
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("graph-core"))
        .unwrap_or_else(|| PathBuf::from("./graph_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.store.scheduled_timeout_ms, 10_000);
        assert_eq!(config.jobs.subject_commit_batch, 50);
        assert_eq!(config.jobs.log_batch, 5);
        assert_eq!(config.jobs.merge_candidate_limit, 10);
        assert_eq!(config.jobs.merge_discovery_timeout_ms, 60_000);
        assert!(config.transformers.type_coercion);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GraphConfig::from_toml(
            r#"
            [store]
            backend = "memory"

            [jobs.merge_duplicates]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_connections, 20);
        assert!(!config.jobs.merge_duplicates.enabled);
        assert_eq!(config.jobs.merge_duplicates.interval_secs, 300);
        assert!(config.jobs.replace_subject_identifiers.enabled);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = GraphConfig::from_toml("[store\nbackend=");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_database_path_resolution() {
        let mut config = GraphConfig::default();
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/graph.db")
        );

        config.store.database_file = PathBuf::from("/abs/other.db");
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/abs/other.db")
        );
    }
}
