// Pipeline configuration
//
// Two operator knobs matter most: `chunk_size` (read granularity) and
// `max_concurrency` (parse tasks in flight). Everything else has a default.

use serde::{Deserialize, Serialize};

use crate::core::Dialect;
use crate::error::ConfigError;

/// Default read granularity (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of parse tasks in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Default hard row width.
pub const DEFAULT_MAX_FIELDS: usize = 64;

/// Default ceiling for a leftover that never reaches a record boundary (256 MB).
pub const DEFAULT_MAX_LEFTOVER: usize = 256 * 1024 * 1024;

/// How a chunk plus leftover is turned into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// Find the last safe boundary first, then tokenize the complete part.
    #[default]
    SplitThenTokenize,
    /// Tokenize the combined buffer in one pass; the tail after the last
    /// terminated record becomes the leftover.
    LeftoverCombine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes read per step.
    pub chunk_size: usize,
    /// Maximum parse tasks in flight; the reader blocks beyond this.
    pub max_concurrency: usize,
    /// Worker threads. `None` picks from available parallelism.
    pub workers: Option<usize>,
    /// Hard row width; extra fields are dropped.
    pub max_fields: usize,
    /// Largest leftover tolerated before the run fails.
    pub max_leftover: usize,
    /// Used by `ChunkParser` and the streaming transformer. The pipeline
    /// reader always cuts at record boundaries.
    pub strategy: ParseStrategy,
    pub dialect: Dialect,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            workers: None,
            max_fields: DEFAULT_MAX_FIELDS,
            max_leftover: DEFAULT_MAX_LEFTOVER,
            strategy: ParseStrategy::default(),
            dialect: Dialect::standard(),
        }
    }
}

impl PipelineConfig {
    /// Parse from JSON and validate. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_max_fields(mut self, max_fields: usize) -> Self {
        self.max_fields = max_fields;
        self
    }

    pub fn with_max_leftover(mut self, max_leftover: usize) -> Self {
        self.max_leftover = max_leftover;
        self
    }

    pub fn with_strategy(mut self, strategy: ParseStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk_size"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Zero("max_concurrency"));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Zero("workers"));
        }
        if self.max_fields == 0 {
            return Err(ConfigError::Zero("max_fields"));
        }
        if self.max_leftover < self.chunk_size {
            return Err(ConfigError::LeftoverBelowChunk {
                max_leftover: self.max_leftover,
                chunk_size: self.chunk_size,
            });
        }
        self.dialect.validate()
    }

    /// Worker thread count to use.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(recommended_threads)
    }
}

/// Available parallelism, capped at 8.
pub fn recommended_threads() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get().min(8))
        .unwrap_or(4)
}
