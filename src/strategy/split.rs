// Split-then-tokenize
//
// The boundary splitter decides where the complete part ends; only that part
// is decoded and tokenized. The leftover is never decoded, so a multi-byte
// character cut at the chunk end simply waits in the leftover.

use super::{check_leftover, decode, ParsedBatch};
use crate::core::{BoundarySplitter, SplitOutcome, Tokenizer};
use crate::error::ChunkError;
use crate::result::ParsedChunk;

pub fn split_then_tokenize(
    splitter: &BoundarySplitter,
    tokenizer: &Tokenizer,
    chunk: &[u8],
    leftover: &[u8],
    offset: u64,
    max_leftover: usize,
) -> Result<ParsedBatch, ChunkError> {
    let SplitOutcome { complete, leftover } = splitter.split(leftover, chunk);
    check_leftover(&leftover, max_leftover)?;

    let text = decode(complete, offset)?;
    // Complete part ends with a terminator, so there is no tail to flush
    let rows = tokenizer.tokenize(&text);

    Ok(ParsedBatch {
        chunk: ParsedChunk::new(text, rows, tokenizer.dialect().quote),
        leftover,
    })
}
