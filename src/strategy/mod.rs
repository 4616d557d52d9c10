// Chunk parsing strategies
//
// Both strategies take `(chunk, leftover)` and produce rows for every
// complete record plus the new leftover. Which one runs is a configuration
// choice (`ParseStrategy`), not a type choice: callers hold a `ChunkParser`.
//
// - split:   find the last safe boundary, decode and tokenize the prefix
// - combine: decode and tokenize the combined buffer in one pass, derive the
//            leftover from where the last terminated record ended

pub mod combine;
pub mod split;

use crate::config::{ParseStrategy, PipelineConfig};
use crate::core::{BoundarySplitter, Tokenizer};
use crate::error::{ChunkError, ConfigError};
use crate::result::ParsedChunk;
use crate::stream::CarriesLeftover;

pub use combine::leftover_combine;
pub use split::split_then_tokenize;

/// Rows parsed from one step plus the bytes carried to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatch {
    pub chunk: ParsedChunk,
    pub leftover: Vec<u8>,
}

impl CarriesLeftover for ParsedBatch {
    fn leftover(&self) -> &[u8] {
        &self.leftover
    }
}

/// Decode an owned buffer without copying it.
pub fn decode(bytes: Vec<u8>, offset: u64) -> Result<String, ChunkError> {
    String::from_utf8(bytes).map_err(|e| ChunkError::Decode {
        offset,
        valid_up_to: e.utf8_error().valid_up_to(),
    })
}

/// Checks a leftover against its ceiling.
#[inline]
pub(crate) fn check_leftover(leftover: &[u8], limit: usize) -> Result<(), ChunkError> {
    if leftover.len() > limit {
        return Err(ChunkError::LeftoverOverflow {
            size: leftover.len(),
            limit,
        });
    }
    Ok(())
}

/// Parser for one chunk at a time, configured with a strategy, dialect, row
/// width and leftover ceiling.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParser {
    strategy: ParseStrategy,
    splitter: BoundarySplitter,
    tokenizer: Tokenizer,
    max_leftover: usize,
}

impl ChunkParser {
    /// Validates `config` first: a dialect with non-ASCII structural bytes
    /// would put field offsets inside multi-byte characters.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ChunkParser {
            strategy: config.strategy,
            splitter: BoundarySplitter::new(config.dialect),
            tokenizer: Tokenizer::new(config.dialect, config.max_fields),
            max_leftover: config.max_leftover,
        })
    }

    pub fn strategy(&self) -> ParseStrategy {
        self.strategy
    }

    pub fn splitter(&self) -> &BoundarySplitter {
        &self.splitter
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Parse every complete record in `leftover ++ chunk`. Error offsets
    /// count from the first byte of `leftover`.
    pub fn parse(&self, chunk: &[u8], leftover: &[u8]) -> Result<ParsedBatch, ChunkError> {
        self.parse_at(chunk, leftover, 0)
    }

    /// Like [`parse`](Self::parse), with `offset` the input position of the
    /// first byte of `leftover`.
    pub fn parse_at(
        &self,
        chunk: &[u8],
        leftover: &[u8],
        offset: u64,
    ) -> Result<ParsedBatch, ChunkError> {
        match self.strategy {
            ParseStrategy::SplitThenTokenize => split_then_tokenize(
                &self.splitter,
                &self.tokenizer,
                chunk,
                leftover,
                offset,
                self.max_leftover,
            ),
            ParseStrategy::LeftoverCombine => {
                leftover_combine(&self.tokenizer, chunk, leftover, offset, self.max_leftover)
            }
        }
    }

    /// Decode and tokenize a buffer that is known to hold only whole records,
    /// except possibly an unterminated last one (end of input).
    pub fn parse_owned(&self, bytes: Vec<u8>, offset: u64) -> Result<ParsedChunk, ChunkError> {
        let text = decode(bytes, offset)?;
        let rows = self.tokenizer.tokenize(&text);
        Ok(ParsedChunk::new(text, rows, self.tokenizer.dialect().quote))
    }

    /// Tokenize a final leftover as an unterminated last record.
    pub fn finalize(&self, leftover: Vec<u8>) -> Result<ParsedChunk, ChunkError> {
        self.parse_owned(leftover, 0)
    }

    /// [`finalize`](Self::finalize) for a leftover starting at input
    /// position `offset`.
    pub fn finalize_at(&self, leftover: Vec<u8>, offset: u64) -> Result<ParsedChunk, ChunkError> {
        self.parse_owned(leftover, offset)
    }
}
