//! `elegance.toml`: engine, scheduler and scoring settings for the CLI.
//!
//! Every section is optional. A missing file yields the defaults, and
//! command-line flags override whatever the file says.

use chess_analysis::config::{load_toml_or_default, ConfigError};
use chess_analysis::{EngineConfig, SchedulerConfig, ScoringPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "elegance.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CliConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub scoring: ScoringPolicy,
}

/// Flag values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub engine: Option<PathBuf>,
    pub depth: Option<u32>,
    pub jobs: Option<usize>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml_or_default(path)
    }

    /// Apply command-line overrides and check the result.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(path) = &overrides.engine {
            self.engine.path = path.clone();
        }
        if let Some(depth) = overrides.depth {
            self.engine.depth = depth;
        }
        if let Some(jobs) = overrides.jobs {
            if jobs == 0 {
                return Err(ConfigError::Invalid("--jobs must be at least 1".to_string()));
            }
            self.scheduler = self.scheduler.with_max_concurrency(jobs);
        }
        self.engine.validate()?;
        self.scoring.validate()?;
        Ok(self)
    }
}
