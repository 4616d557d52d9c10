// Single-pass leftover combine
//
// Decode `leftover ++ chunk` once, tokenize terminated records only, and cut
// the leftover at the offset where the last terminated record ended. An
// incomplete UTF-8 sequence at the very end is not an error here: it is
// carried over with the leftover until the rest of the character arrives.

use super::{check_leftover, ParsedBatch};
use crate::core::Tokenizer;
use crate::error::ChunkError;
use crate::result::ParsedChunk;

pub fn leftover_combine(
    tokenizer: &Tokenizer,
    chunk: &[u8],
    leftover: &[u8],
    offset: u64,
    max_leftover: usize,
) -> Result<ParsedBatch, ChunkError> {
    let mut combined = Vec::with_capacity(leftover.len() + chunk.len());
    combined.extend_from_slice(leftover);
    combined.extend_from_slice(chunk);

    let (mut text, tail) = decode_with_tail(combined, offset)?;
    let (rows, consumed) = tokenizer.tokenize_complete(&text);

    let mut rest = text.as_bytes()[consumed..].to_vec();
    rest.extend_from_slice(&tail);
    check_leftover(&rest, max_leftover)?;
    // `consumed` sits right after an ASCII terminator
    text.truncate(consumed);

    Ok(ParsedBatch {
        chunk: ParsedChunk::new(text, rows, tokenizer.dialect().quote),
        leftover: rest,
    })
}

/// Decode, splitting off an incomplete trailing UTF-8 sequence.
fn decode_with_tail(bytes: Vec<u8>, offset: u64) -> Result<(String, Vec<u8>), ChunkError> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok((text, Vec::new())),
        Err(e) => {
            let utf8 = e.utf8_error();
            if utf8.error_len().is_some() {
                return Err(ChunkError::Decode {
                    offset,
                    valid_up_to: utf8.valid_up_to(),
                });
            }
            let mut bytes = e.into_bytes();
            let tail = bytes.split_off(utf8.valid_up_to());
            let text = String::from_utf8(bytes).map_err(|e| ChunkError::Decode {
                offset,
                valid_up_to: e.utf8_error().valid_up_to(),
            })?;
            Ok((text, tail))
        }
    }
}
