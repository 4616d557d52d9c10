// CSV dialect: the three structural bytes every scan agrees on.
//
// The splitter and the tokenizer must toggle quote parity on exactly the
// same bytes, so both take their structural bytes from one `Dialect`.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Structural bytes of a CSV input.
///
/// Only single ASCII bytes are supported. `\r` is never a structural byte on
/// its own: it is treated as part of a `\r\n` terminator by the tokenizer and
/// as data everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    /// Field delimiter (default `,`).
    pub delimiter: u8,
    /// Quote byte (default `"`). Doubled quotes inside a quoted field are an
    /// escaped quote.
    pub quote: u8,
    /// Record terminator (default `\n`).
    pub newline: u8,
}

impl Dialect {
    /// Comma delimiter, double-quote quoting, `\n` terminator.
    pub const fn standard() -> Self {
        Dialect {
            delimiter: b',',
            quote: b'"',
            newline: b'\n',
        }
    }

    /// Same as `standard()` but with a different delimiter.
    pub const fn with_delimiter(delimiter: u8) -> Self {
        Dialect {
            delimiter,
            quote: b'"',
            newline: b'\n',
        }
    }

    /// Reject byte combinations that would make the scans ambiguous.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bytes = [self.delimiter, self.quote, self.newline];
        if bytes.iter().any(|b| !b.is_ascii()) {
            return Err(ConfigError::InvalidDialect("structural bytes must be ASCII"));
        }
        if bytes.contains(&b'\r') {
            return Err(ConfigError::InvalidDialect(
                "\\r is reserved for \\r\\n terminators",
            ));
        }
        if self.delimiter == self.quote
            || self.delimiter == self.newline
            || self.quote == self.newline
        {
            return Err(ConfigError::InvalidDialect("structural bytes must be distinct"));
        }
        Ok(())
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::standard()
    }
}

/// Length of the record terminator ending at `newline_pos`: 2 for `\r\n`,
/// 1 for a lone newline byte. Only `\n` terminators absorb a preceding `\r`.
#[inline]
pub fn terminator_len(input: &[u8], newline_pos: usize, dialect: &Dialect) -> usize {
    if dialect.newline == b'\n' && newline_pos > 0 && input[newline_pos - 1] == b'\r' {
        2
    } else {
        1
    }
}
