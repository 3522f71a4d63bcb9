//! Immutable configuration for engine sessions and the scheduler.
//!
//! Values are read once (from TOML or built in code) and shared read-only by
//! every session through an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How to launch and drive one analysis engine.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to the engine executable.
    #[serde(default = "default_engine_path")]
    pub path: PathBuf,
    /// Fixed search depth for every position.
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Search threads per engine. More than one makes results nondeterministic.
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Hash table size in MB, left to the engine default when unset.
    #[serde(default)]
    pub hash_mb: Option<u32>,
    /// Endgame tablebase directory passed as `SyzygyPath`.
    #[serde(default)]
    pub syzygy_path: Option<PathBuf>,
    /// Deadline for `uci`/`isready` round trips.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Deadline for a single fixed-depth search.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    /// How long to wait for the engine to exit after `quit` before killing it.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Extra `setoption` pairs sent after the standard ones.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_engine_path() -> PathBuf {
    PathBuf::from("stockfish")
}

fn default_depth() -> u32 {
    12
}

fn default_threads() -> u32 {
    1
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_search_timeout_ms() -> u64 {
    60_000
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            depth: default_depth(),
            threads: default_threads(),
            hash_mb: None,
            syzygy_path: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            options: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Default configuration for the engine at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Rejects values no engine can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::Invalid("depth must be at least 1".to_string()));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }
        if self.handshake_timeout_ms == 0 || self.search_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Pool sizing and fault policy.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of engine sessions alive at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Consecutive session faults tolerated per game before it fails.
    #[serde(default = "default_max_consecutive_faults")]
    pub max_consecutive_faults: u32,
}

/// Logical cores minus one, never below one.
pub fn default_max_concurrency() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

fn default_max_consecutive_faults() -> u32 {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_consecutive_faults: default_max_consecutive_faults(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }
}

/// Loads a TOML file into `T`, returning `T::default()` if the file is absent.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_engine_config_defaults_from_empty_toml() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.depth, 12);
        assert_eq!(config.threads, 1);
        assert_eq!(config.search_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_engine_config_overrides() {
        let config: EngineConfig = toml::from_str(
            r#"
            path = "/usr/games/stockfish"
            depth = 18
            syzygy_path = "/opt/syzygy"
            shutdown_grace_ms = 500

            [options]
            UCI_AnalyseMode = "true"
            "#,
        )
        .unwrap();

        assert_eq!(config.path, PathBuf::from("/usr/games/stockfish"));
        assert_eq!(config.depth, 18);
        assert_eq!(config.syzygy_path, Some(PathBuf::from("/opt/syzygy")));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(500));
        assert_eq!(config.options.get("UCI_AnalyseMode").map(String::as_str), Some("true"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let config = EngineConfig::new("stockfish").with_depth(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_scheduler_default_concurrency_is_positive() {
        let config = SchedulerConfig::default();
        assert!(config.max_concurrency >= 1);
        assert!(config.max_concurrency <= num_cpus::get().max(1));
        assert_eq!(config.max_consecutive_faults, 2);
        assert_eq!(SchedulerConfig::default().with_max_concurrency(0).max_concurrency, 1);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config: SchedulerConfig = load_toml_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency = \"many\"").unwrap();
        let result: Result<SchedulerConfig, _> = load_toml_or_default(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
