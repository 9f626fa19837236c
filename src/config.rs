//! Configuration system.
//!
//! Merges, in order:
//! 1. `config.toml` (base configuration)
//! 2. `config.local.toml` (local overrides, git-ignored)
//! 3. Environment variables (`ENGINE_` prefix, `__` as the nesting
//!    separator, e.g. `ENGINE_STORAGE__INITIAL_ROW_CAPACITY=50000`)

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub gin: GinConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pre-sizing hints for row/index storage. Purely a performance knob —
/// every table still grows past these without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_row_capacity")]
    pub initial_row_capacity: usize,
    #[serde(default = "default_index_capacity")]
    pub initial_index_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            initial_row_capacity: default_row_capacity(),
            initial_index_capacity: default_index_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Upper bound on rewrite-rule fixpoint passes before the optimizer
    /// gives up and returns the plan as last rewritten (spec.md §4.3's
    /// rule set is confluent in practice, but a bound avoids an infinite
    /// loop if a future rule pair cycles).
    #[serde(default = "default_fixpoint_iterations")]
    pub max_fixpoint_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_fixpoint_iterations: default_fixpoint_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinConfig {
    /// Build postings for every existing row at index-creation time
    /// rather than lazily on first query.
    #[serde(default = "default_true")]
    pub eager_backfill: bool,
}

impl Default for GinConfig {
    fn default() -> Self {
        GinConfig {
            eager_backfill: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_row_capacity() -> usize {
    1024
}
fn default_index_capacity() -> usize {
    1024
}
fn default_fixpoint_iterations() -> usize {
    16
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            storage: StorageConfig::default(),
            optimizer: OptimizerConfig::default(),
            gin: GinConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()
    }
}
