// Core primitives for chunked CSV parsing

pub mod dialect;
pub mod field;
pub mod splitter;
pub mod tokenizer;

pub use dialect::{terminator_len, Dialect};
pub use field::{is_quoted, unquote};
pub use splitter::{
    find_record_boundary, find_record_boundary_from, BoundarySplitter, ScanState, SplitOutcome,
};
pub use tokenizer::{Field, Row, RowSet, RowView, Tokenizer};
