//! Machine configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via HSFSM_CONFIG)
//! 3. Environment variables
//!
//! Connection strings and credentials are the caller's business and are not
//! part of this configuration.

use crate::definition::{TransitionRule, TransitionTable, TransitionTableRaw};
use crate::error::CoreError;
use crate::statement::{Dialect, Layout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration of one entity kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where entities are persisted.
    pub store: StoreConfig,
    /// Engine behaviour.
    pub engine: EngineConfig,
    /// Transition table.
    pub machine: MachineConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HSFSM_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.store.apply_env_overrides();
        self.engine.apply_env_overrides();
    }

    /// Persistence layout, validated for the configured dialect.
    pub fn layout(&self) -> Result<Layout, ConfigError> {
        let layout =
            Layout::with_id_column(&self.store.table, &self.store.id_column, &self.store.field)?;
        layout.validate_for(self.store.dialect)?;
        Ok(layout)
    }

    /// Builds the transition table, checking reachability when enabled.
    pub fn build_table(&self) -> Result<TransitionTable, ConfigError> {
        let table = TransitionTable::from_raw(self.machine.0.clone())?;
        if self.engine.validate_reachability {
            table.validate_reachability()?;
        }
        Ok(table)
    }

    /// Default per-operation timeout; `None` when `timeout_ms` is 0.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.engine.timeout()
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

/// Persistence layout and SQL dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Table holding one row per entity.
    pub table: String,
    /// Unique key column.
    pub id_column: String,
    /// State column.
    pub field: String,
    /// SQL dialect of the backing store. Bounds identifier lengths in
    /// [`Config::layout`] and must match the dialect of a SQL store.
    pub dialect: Dialect,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: "task".to_string(),
            id_column: "id".to_string(),
            field: "state".to_string(),
            dialect: Dialect::MySql,
        }
    }
}

impl StoreConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(table) = std::env::var("HSFSM_TABLE") {
            self.table = table;
        }

        if let Ok(column) = std::env::var("HSFSM_ID_COLUMN") {
            self.id_column = column;
        }

        if let Ok(field) = std::env::var("HSFSM_FIELD") {
            self.field = field;
        }

        if let Ok(dialect) = std::env::var("HSFSM_DIALECT") {
            match dialect.parse() {
                Ok(parsed) => self.dialect = parsed,
                Err(e) => tracing::warn!("ignoring HSFSM_DIALECT: {}", e),
            }
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-operation timeout in milliseconds (0 = none).
    pub timeout_ms: u64,
    /// Reject tables with states unreachable from the initial state.
    pub validate_reachability: bool,
}

impl EngineConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("HSFSM_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.timeout_ms = ms;
            }
        }

        if let Ok(validate) = std::env::var("HSFSM_VALIDATE_REACHABILITY") {
            self.validate_reachability = validate == "1" || validate.to_lowercase() == "true";
        }
    }

    /// Returns the timeout as Duration, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Transition table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineConfig(pub TransitionTableRaw);

impl Default for MachineConfig {
    /// The task lifecycle.
    fn default() -> Self {
        Self(TransitionTableRaw {
            initial: "Initializing".to_string(),
            events: vec![
                TransitionRule::new("Ready", ["Initializing", "Error"], "Running"),
                TransitionRule::new("NotReady", ["Running"], "Error"),
                TransitionRule::new("Stop", ["Initializing", "Running", "Error"], "Stopped"),
                TransitionRule::new("Delete", ["Stopped"], "Deleted"),
            ],
        })
    }
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

impl From<CoreError> for ConfigError {
    fn from(e: CoreError) -> Self {
        ConfigError::ValidationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.table, "task");
        assert_eq!(config.store.field, "state");
        assert_eq!(config.store.dialect, Dialect::MySql);
        assert!(config.default_timeout().is_none());

        let table = config.build_table().unwrap();
        assert_eq!(table.initial().as_str(), "Initializing");
        assert_eq!(table.rules().len(), 4);
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hsfsm.yaml");
        std::fs::write(
            &path,
            r#"
store:
  table: orders
  id_column: order_id
  field: status
  dialect: postgres
engine:
  timeout_ms: 250
machine:
  initial: created
  events:
    - name: Pay
      from: created
      to: paid
    - name: Refund
      from: [paid, shipped]
      to: refunded
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.store.dialect, Dialect::Postgres);
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(250)));

        let layout = config.layout().unwrap();
        assert_eq!(layout.table(), "orders");
        assert_eq!(layout.id_column(), "order_id");
        assert_eq!(layout.field(), "status");

        let table = config.build_table().unwrap();
        assert_eq!(table.lookup("Refund").unwrap().sources.len(), 2);
    }

    #[test]
    fn test_reachability_check_is_opt_in() {
        let mut config = Config::default();
        config.machine.0.events.push(TransitionRule::new("Revive", ["Zombie"], "Running"));
        assert!(config.build_table().is_ok());

        config.engine.validate_reachability = true;
        let err = config.build_table().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let mut config = Config::default();
        config.store.table = "task; DROP TABLE task".to_string();
        assert!(matches!(config.layout(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_dialect_bounds_identifier_length() {
        let mut config = Config::default();
        config.store.field = "s".repeat(64);
        assert!(config.layout().is_ok());

        config.store.dialect = Dialect::Postgres;
        assert!(matches!(config.layout(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.yaml");
        let config = Config::default();
        config.save(&path).unwrap();

        let parsed = Config::from_file(&path).unwrap();
        assert_eq!(parsed.machine, config.machine);
        assert_eq!(parsed.store.table, config.store.table);
    }
}
