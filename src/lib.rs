// chunkcsv - Chunked, boundary-safe, zero-copy CSV processing
//
// Components:
// core:     dialect, boundary splitter, zero-copy tokenizer, field unquoting
// strategy: chunk + leftover parsing (split-then-tokenize, leftover-combine)
// pipeline: reader -> worker pool -> ordered drain, with backpressure and abort
// stream:   push-based transformer for open-ended chunk sources
// validate: per-row validation, column rule model

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod result;
pub mod strategy;
pub mod stream;
pub mod validate;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub use crate::config::{ParseStrategy, PipelineConfig};
pub use crate::core::{BoundarySplitter, Dialect, Field, Row, RowSet, RowView, SplitOutcome, Tokenizer};
pub use crate::error::{ChunkError, ConfigError, PipelineError, SchemaError, SinkError, StreamError};
pub use crate::pipeline::{try_sink, CancelToken, ChunkPipeline, ChunkSink, RunSummary};
pub use crate::result::{ChunkOutcome, ChunkResult, ParsedChunk};
pub use crate::strategy::{ChunkParser, ParsedBatch};
pub use crate::stream::{csv_transformer, CarriesLeftover, ErrorPolicy, StreamingTransformer};
pub use crate::validate::{
    ColumnRule, ColumnType, RowValidator, SchemaValidator, ValidationError, Violation,
};
