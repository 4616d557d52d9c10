// Field unquoting for consumers
//
// The tokenizer leaves quotes in place. Consumers that need the logical
// value call `unquote`, which borrows unless an escaped quote has to be
// collapsed.

use std::borrow::Cow;

/// Strip surrounding quotes and collapse doubled quotes.
/// Returns `Cow::Borrowed` when no unescaping is needed.
#[inline]
pub fn unquote(raw: &str, quote: u8) -> Cow<'_, str> {
    // Not quoted - return as-is
    if !is_quoted(raw, quote) {
        return Cow::Borrowed(raw);
    }

    // Quote is ASCII, so these slice points are char boundaries
    let inner = &raw[1..raw.len() - 1];

    // Fast path: no escaped quotes inside
    if !inner.as_bytes().contains(&quote) {
        return Cow::Borrowed(inner);
    }

    // Slow path: collapse doubled quotes
    let q = quote as char;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == q && chars.peek() == Some(&q) {
            chars.next();
        }
        result.push(c);
    }
    Cow::Owned(result)
}

/// True when the raw field text is wrapped in quotes.
#[inline]
pub fn is_quoted(raw: &str, quote: u8) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0] == quote && bytes[bytes.len() - 1] == quote
}
