// Per-chunk results handed to the downstream sink.

use crate::core::{RowSet, RowView};
use crate::error::ChunkError;
use crate::validate::ValidationError;

/// Rows of one chunk together with the decoded buffer they point into.
///
/// The buffer is owned here and released when the chunk is dropped; rows
/// are only reachable through this type, so they can never outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunk {
    text: String,
    rows: RowSet,
    quote: u8,
    violations: Vec<ValidationError>,
}

impl ParsedChunk {
    pub fn new(text: String, rows: RowSet, quote: u8) -> Self {
        ParsedChunk {
            text,
            rows,
            quote,
            violations: Vec::new(),
        }
    }

    pub fn with_violations(mut self, violations: Vec<ValidationError>) -> Self {
        self.violations = violations;
        self
    }

    /// The decoded buffer.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn quote(&self) -> u8 {
        self.quote
    }

    pub fn row(&self, index: usize) -> Option<RowView<'_>> {
        self.rows.view(index, &self.text, self.quote)
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows.iter(&self.text, self.quote)
    }

    pub fn violations(&self) -> &[ValidationError] {
        &self.violations
    }

    /// Copy every field out, unquoted. Allocates; meant for small inputs
    /// and inspection.
    pub fn to_strings(&self) -> Vec<Vec<String>> {
        self.iter()
            .map(|row| {
                (0..row.len())
                    .filter_map(|i| row.unquoted(i).map(|v| v.into_owned()))
                    .collect()
            })
            .collect()
    }
}

/// Outcome of parsing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Parsed(ParsedChunk),
    Failed(ChunkError),
}

/// One chunk's outcome, tagged with its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    /// Submission order, starting at 0.
    pub sequence: u64,
    /// Absolute offset of the chunk's first byte in the input.
    pub offset: u64,
    pub outcome: ChunkOutcome,
}

impl ChunkResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Parsed(_))
    }

    pub fn parsed(&self) -> Option<&ParsedChunk> {
        match &self.outcome {
            ChunkOutcome::Parsed(p) => Some(p),
            ChunkOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ChunkError> {
        match &self.outcome {
            ChunkOutcome::Failed(e) => Some(e),
            ChunkOutcome::Parsed(_) => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.parsed().map_or(0, ParsedChunk::len)
    }

    pub fn violation_count(&self) -> usize {
        self.parsed().map_or(0, |p| p.violations().len())
    }
}
