// Reader stage
//
// Reads fixed-size chunks straight into the carried buffer (leftover first,
// fresh bytes after it), splits at the last safe record boundary and hands
// the complete part off by value. The leftover never leaves this stage, and
// its quote state is carried with it so it is never rescanned.

use std::io::{ErrorKind, Read};
use tracing::{debug, trace};

use super::state::RunContext;
use crate::core::{BoundarySplitter, ScanState, SplitOutcome};
use crate::error::PipelineError;

/// Bytes read and parts handed off by one reader pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadStats {
    pub bytes: u64,
    pub submitted: u64,
}

/// Fill `buf` as far as the source allows. Returns bytes read; fewer than
/// `buf.len()` only at end of input.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Drive `source` to the end, calling `submit(offset, bytes)` for each
/// boundary-safe part. `submit` returns false once the pipeline no longer
/// accepts work; the reader then stops quietly and the run reports whatever
/// cause shut it down.
pub(crate) fn read_chunks<R, F>(
    source: &mut R,
    splitter: &BoundarySplitter,
    chunk_size: usize,
    max_leftover: usize,
    ctx: &RunContext,
    mut submit: F,
) -> Result<ReadStats, PipelineError>
where
    R: Read,
    F: FnMut(u64, Vec<u8>) -> bool,
{
    let mut stats = ReadStats::default();
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size);
    // Absolute input offset of buffer[0]
    let mut buffer_offset: u64 = 0;
    // Only freshly read bytes are scanned; a record spanning many reads
    // stays linear in its length
    let mut scan = ScanState::default();

    loop {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if ctx.is_aborted() {
            debug!(offset = buffer_offset, "reader stopping after abort");
            return Ok(stats);
        }

        let start = buffer.len();
        buffer.resize(start + chunk_size, 0);
        let n = read_full(source, &mut buffer[start..])?;
        buffer.truncate(start + n);
        if n == 0 {
            break;
        }
        stats.bytes += n as u64;

        let SplitOutcome { complete, leftover } = splitter.split_resume(buffer, &mut scan);
        buffer = leftover;

        if !complete.is_empty() {
            let len = complete.len() as u64;
            trace!(offset = buffer_offset, len, "submitting chunk");
            if !submit(buffer_offset, complete) {
                return Ok(stats);
            }
            stats.submitted += 1;
            buffer_offset += len;
        }

        if buffer.len() > max_leftover {
            return Err(PipelineError::LeftoverOverflow {
                size: buffer.len(),
                limit: max_leftover,
                offset: buffer_offset,
            });
        }
    }

    if !buffer.is_empty() {
        debug!(
            offset = buffer_offset,
            len = buffer.len(),
            "submitting final unterminated record"
        );
        if submit(buffer_offset, buffer) {
            stats.submitted += 1;
        }
    }
    Ok(stats)
}
