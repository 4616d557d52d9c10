// Error taxonomy
//
// Non-fatal chunk errors travel inside `ChunkResult`s. Fatal errors end a
// pipeline run. Validation problems are plain data (`ValidationError`) and
// never show up here.

use thiserror::Error;

/// Non-fatal, per-chunk failure. Reported to the sink, the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk at byte {offset} is not valid UTF-8 (valid up to {valid_up_to})")]
    Decode { offset: u64, valid_up_to: usize },

    #[error("leftover of {size} bytes exceeds the {limit} byte ceiling")]
    LeftoverOverflow { size: usize, limit: usize },
}

/// Failure reported by a downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sink rejected chunk: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        SinkError(msg.into())
    }
}

/// Fatal error: ends the run. Only the first one raised is reported.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no record boundary within {size} bytes at offset {offset} (limit {limit})")]
    LeftoverOverflow { size: usize, limit: usize, offset: u64 },

    #[error("worker panicked on chunk {sequence}: {message}")]
    WorkerPanicked { sequence: u64, message: String },

    #[error("result for chunk {sequence} was lost")]
    ResultLost { sequence: u64 },

    #[error("result drain panicked: {0}")]
    DrainPanicked(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("run cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid dialect: {0}")]
    InvalidDialect(&'static str),

    #[error("max_leftover ({max_leftover}) must be at least chunk_size ({chunk_size})")]
    LeftoverBelowChunk { max_leftover: usize, chunk_size: usize },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid column rules.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("column {index}: invalid pattern: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("column {0} declared twice")]
    DuplicateColumn(usize),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure surfaced by a streaming transformer under `ErrorPolicy::FailFast`.
#[derive(Debug, Error)]
pub enum StreamError<E>
where
    E: std::error::Error + 'static,
{
    #[error("transform failed on chunk {index}: {source}")]
    Transform {
        index: u64,
        #[source]
        source: E,
    },
}

impl<E> StreamError<E>
where
    E: std::error::Error + 'static,
{
    /// Index of the chunk that failed.
    pub fn index(&self) -> u64 {
        match self {
            StreamError::Transform { index, .. } => *index,
        }
    }

    pub fn into_source(self) -> E {
        match self {
            StreamError::Transform { source, .. } => source,
        }
    }
}
