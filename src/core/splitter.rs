// Boundary splitter: find the last record boundary that is safe to parse
// on its own.
//
// The leftover handed in from the previous step always starts at a record
// start (or at the start of input), so a forward quote-parity scan over
// `leftover ++ chunk` knows the exact quote state at every newline. The
// rightmost newline seen outside quotes is the split point.

use memchr::memchr2_iter;

use super::dialect::Dialect;

/// Byte offset one past the last record terminator that sits outside quotes,
/// or `None` when `input` holds no complete record yet.
///
/// Every quote byte toggles parity, so a doubled `""` toggles twice and leaves
/// the state unchanged. The tokenizer applies the same rule.
pub fn find_record_boundary(input: &[u8], dialect: &Dialect) -> Option<usize> {
    find_record_boundary_from(input, 0, false, dialect).0
}

/// Resume a boundary scan at `from`, where the quote parity of
/// `input[..from]` is `in_quotes`. Returns the last boundary found in
/// `input[from..]` and the parity at the end of `input`.
pub fn find_record_boundary_from(
    input: &[u8],
    from: usize,
    mut in_quotes: bool,
    dialect: &Dialect,
) -> (Option<usize>, bool) {
    let mut boundary = None;

    for pos in memchr2_iter(dialect.quote, dialect.newline, &input[from..]) {
        let pos = from + pos;
        if input[pos] == dialect.quote {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            boundary = Some(pos + 1);
        }
    }

    (boundary, in_quotes)
}

/// How far a growing buffer has been scanned.
///
/// Valid only while the buffer keeps its front: bytes may be appended, never
/// changed or removed, except through [`BoundarySplitter::split_resume`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    /// Leading bytes already scanned.
    pub scanned: usize,
    /// Quote parity after `scanned` bytes.
    pub in_quotes: bool,
}

/// Result of splitting an owned buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Complete records, ending right after a terminator. Empty when no
    /// boundary was found.
    pub complete: Vec<u8>,
    /// Partial trailing record, to be prepended to the next chunk.
    pub leftover: Vec<u8>,
}

impl SplitOutcome {
    pub fn has_complete(&self) -> bool {
        !self.complete.is_empty()
    }
}

/// Splits `leftover ++ chunk` at the rightmost quote-safe record boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundarySplitter {
    dialect: Dialect,
}

impl BoundarySplitter {
    pub fn new(dialect: Dialect) -> Self {
        BoundarySplitter { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Offset one past the last safe terminator in `combined`.
    #[inline]
    pub fn boundary(&self, combined: &[u8]) -> Option<usize> {
        find_record_boundary(combined, &self.dialect)
    }

    /// Split a combined buffer without copying the complete part.
    ///
    /// Only the tail past the boundary is moved into a new allocation.
    pub fn split_owned(&self, combined: Vec<u8>) -> SplitOutcome {
        let boundary = self.boundary(&combined);
        cut(combined, boundary)
    }

    /// Like [`split_owned`](Self::split_owned), but only scans the bytes
    /// appended since the last call. `state` is updated to describe the
    /// returned leftover, so the next call resumes where this one stopped.
    pub fn split_resume(&self, combined: Vec<u8>, state: &mut ScanState) -> SplitOutcome {
        let from = state.scanned.min(combined.len());
        let (boundary, in_quotes) =
            find_record_boundary_from(&combined, from, state.in_quotes, &self.dialect);
        let out = cut(combined, boundary);
        // The boundary sits outside quotes, so the parity of the leftover
        // alone is the parity at the end of the buffer
        *state = ScanState {
            scanned: out.leftover.len(),
            in_quotes,
        };
        out
    }

    /// Borrowing split of an already-combined buffer: `(complete, leftover)`.
    pub fn split_slice<'a>(&self, combined: &'a [u8]) -> (&'a [u8], &'a [u8]) {
        match self.boundary(combined) {
            Some(end) => combined.split_at(end),
            None => (&combined[..0], combined),
        }
    }

    /// Combine `leftover` with `chunk` and split the result.
    ///
    /// An empty chunk leaves the leftover untouched.
    pub fn split(&self, leftover: &[u8], chunk: &[u8]) -> SplitOutcome {
        if chunk.is_empty() {
            return SplitOutcome {
                complete: Vec::new(),
                leftover: leftover.to_vec(),
            };
        }
        let mut combined = Vec::with_capacity(leftover.len() + chunk.len());
        combined.extend_from_slice(leftover);
        combined.extend_from_slice(chunk);
        self.split_owned(combined)
    }
}

fn cut(mut combined: Vec<u8>, boundary: Option<usize>) -> SplitOutcome {
    match boundary {
        Some(end) => {
            let leftover = combined.split_off(end);
            SplitOutcome {
                complete: combined,
                leftover,
            }
        }
        None => SplitOutcome {
            complete: Vec::new(),
            leftover: combined,
        },
    }
}
