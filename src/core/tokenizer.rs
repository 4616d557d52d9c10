// Zero-copy tokenizer
//
// Turns a decoded, boundary-safe buffer into row and field offsets. No field
// bytes are copied and nothing is allocated per field: all fields of all rows
// live in one flat `Vec<Field>` and each `Row` points at its slice of it.
//
// Quote parity is toggled on every quote byte, exactly like the boundary
// splitter, so both scans agree on where quoted fields start and end.

use memchr::memchr3_iter;
use std::borrow::Cow;
use std::ops::Range;

use super::dialect::{terminator_len, Dialect};
use super::field::unquote;

/// Half-open byte range `[start, end)` of one field in a decoded buffer.
///
/// Quoted fields keep their quotes; see [`RowView::unquoted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Field {
    pub start: usize,
    pub end: usize,
}

impl Field {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One record: the span of its text (terminator excluded) and the slice of
/// the shared field table that belongs to it.
///
/// A `Row` holds no reference to the buffer it was parsed from. It is only
/// meaningful together with the `RowSet` and text that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub line_start: usize,
    pub line_end: usize,
    first_field: usize,
    field_count: usize,
}

impl Row {
    #[inline]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    #[inline]
    fn field_range(&self) -> Range<usize> {
        self.first_field..self.first_field + self.field_count
    }
}

/// Rows of one chunk plus the flat field table they index into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    rows: Vec<Row>,
    fields: Vec<Field>,
    /// Rows that had more fields than the configured width.
    truncated: usize,
}

impl RowSet {
    fn with_capacity_for(input_len: usize) -> Self {
        RowSet {
            rows: Vec::with_capacity(input_len / 64 + 1),
            fields: Vec::with_capacity(input_len / 8 + 1),
            truncated: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Fields belonging to `row`.
    pub fn fields_of(&self, row: &Row) -> &[Field] {
        &self.fields[row.field_range()]
    }

    /// Total number of fields across all rows.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of rows whose extra fields were dropped at the width limit.
    pub fn truncated_rows(&self) -> usize {
        self.truncated
    }

    /// View row `index` against the buffer it was tokenized from.
    pub fn view<'a>(&'a self, index: usize, text: &'a str, quote: u8) -> Option<RowView<'a>> {
        let row = self.rows.get(index)?;
        Some(RowView {
            text,
            row,
            fields: self.fields_of(row),
            index,
            quote,
        })
    }

    /// Iterate all rows as views over `text`.
    pub fn iter<'a>(&'a self, text: &'a str, quote: u8) -> impl Iterator<Item = RowView<'a>> + 'a {
        self.rows.iter().enumerate().map(move |(index, row)| RowView {
            text,
            row,
            fields: &self.fields[row.field_range()],
            index,
            quote,
        })
    }
}

/// A row resolved against its decoded buffer. Borrowing only.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    text: &'a str,
    row: &'a Row,
    fields: &'a [Field],
    index: usize,
    quote: u8,
}

impl<'a> RowView<'a> {
    /// Position of this row within its chunk.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }

    pub fn fields(&self) -> &'a [Field] {
        self.fields
    }

    /// Raw field text, quotes included.
    pub fn get(&self, i: usize) -> Option<&'a str> {
        self.fields.get(i).map(|f| &self.text[f.range()])
    }

    /// Field text with surrounding quotes stripped and `""` collapsed.
    /// Borrows unless an escaped quote forces a copy.
    pub fn unquoted(&self, i: usize) -> Option<Cow<'a, str>> {
        self.get(i).map(|raw| unquote(raw, self.quote))
    }

    /// The whole record, terminator excluded.
    pub fn line(&self) -> &'a str {
        &self.text[self.row.line_start..self.row.line_end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + 'a {
        let (text, fields) = (self.text, self.fields);
        fields.iter().map(move |f| &text[f.range()])
    }
}

/// Single-pass, quote-aware tokenizer with a hard row width.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    dialect: Dialect,
    max_fields: usize,
}

impl Tokenizer {
    /// `max_fields` is a hard width limit: fields past it are dropped from
    /// the row (counted in [`RowSet::truncated_rows`]), not reported as an
    /// error. A limit of 0 is treated as 1. `dialect` must pass
    /// [`Dialect::validate`]; `ChunkParser::new` checks this.
    pub fn new(dialect: Dialect, max_fields: usize) -> Self {
        Tokenizer {
            dialect,
            max_fields: max_fields.max(1),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn max_fields(&self) -> usize {
        self.max_fields
    }

    /// Tokenize a complete buffer. A trailing record without a terminator is
    /// still emitted and ends at the buffer end.
    pub fn tokenize(&self, text: &str) -> RowSet {
        self.scan(text.as_bytes(), true).0
    }

    /// Tokenize only terminated records. Returns the rows and the offset one
    /// past the last terminator; bytes from there on are unconsumed.
    pub fn tokenize_complete(&self, text: &str) -> (RowSet, usize) {
        self.scan(text.as_bytes(), false)
    }

    fn scan(&self, input: &[u8], flush_tail: bool) -> (RowSet, usize) {
        let Dialect {
            delimiter,
            quote,
            newline,
        } = self.dialect;

        let mut out = RowSet::with_capacity_for(input.len());
        let mut builder = RowBuilder::new(self.max_fields);
        let mut in_quotes = false;
        let mut line_start = 0;
        let mut field_start = 0;

        for pos in memchr3_iter(delimiter, quote, newline, input) {
            let byte = input[pos];
            if byte == quote {
                in_quotes = !in_quotes;
            } else if in_quotes {
                continue;
            } else if byte == delimiter {
                builder.push_field(&mut out, field_start, pos);
                field_start = pos + 1;
            } else {
                // \r\n: the \r belongs to the terminator, not the last field
                let content_end = pos + 1 - terminator_len(input, pos, &self.dialect);
                builder.push_field(&mut out, field_start, content_end);
                builder.finish_row(&mut out, line_start, content_end);
                line_start = pos + 1;
                field_start = line_start;
            }
        }

        let mut consumed = line_start;
        if flush_tail && line_start < input.len() {
            builder.push_field(&mut out, field_start, input.len());
            builder.finish_row(&mut out, line_start, input.len());
            consumed = input.len();
        }

        (out, consumed)
    }
}

/// Per-row bookkeeping while scanning.
struct RowBuilder {
    max_fields: usize,
    first_field: usize,
    count: usize,
    dropped: bool,
}

impl RowBuilder {
    fn new(max_fields: usize) -> Self {
        RowBuilder {
            max_fields,
            first_field: 0,
            count: 0,
            dropped: false,
        }
    }

    #[inline]
    fn push_field(&mut self, out: &mut RowSet, start: usize, end: usize) {
        if self.count < self.max_fields {
            out.fields.push(Field { start, end });
            self.count += 1;
        } else {
            self.dropped = true;
        }
    }

    #[inline]
    fn finish_row(&mut self, out: &mut RowSet, line_start: usize, line_end: usize) {
        out.rows.push(Row {
            line_start,
            line_end,
            first_field: self.first_field,
            field_count: self.count,
        });
        if self.dropped {
            out.truncated += 1;
        }
        self.first_field = out.fields.len();
        self.count = 0;
        self.dropped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_of(text: &str) -> Vec<Vec<String>> {
        let tok = Tokenizer::new(Dialect::standard(), 64);
        let set = tok.tokenize(text);
        set.iter(text, b'"')
            .map(|r| r.iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_simple_rows() {
        assert_eq!(
            rows_of("a,b,c\n1,2,3\n"),
            vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]
        );
    }

    #[test]
    fn test_offsets_are_half_open() {
        let text = "ab,c\n";
        let set = Tokenizer::new(Dialect::standard(), 8).tokenize(text);
        let row = set.rows()[0];
        assert_eq!(row.line_start, 0);
        assert_eq!(row.line_end, 4);
        assert_eq!(
            set.fields_of(&row),
            &[Field { start: 0, end: 2 }, Field { start: 3, end: 4 }]
        );
    }

    #[test]
    fn test_crlf_is_one_terminator() {
        let text = "a,b\r\nc,d\r\n";
        assert_eq!(rows_of(text), vec![vec!["a", "b"], vec!["c", "d"]]);
        let set = Tokenizer::new(Dialect::standard(), 8).tokenize(text);
        assert_eq!(set.rows()[1].line_start, 5);
        assert_eq!(set.rows()[1].line_end, 8);
    }

    #[test]
    fn test_bare_cr_is_data() {
        assert_eq!(rows_of("a\rb\n"), vec![vec!["a\rb"]]);
    }

    #[test]
    fn test_trailing_unterminated_row_emitted() {
        let text = "a,b\nc,d";
        let set = Tokenizer::new(Dialect::standard(), 8).tokenize(text);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[1].line_end, text.len());
        assert_eq!(rows_of(text)[1], vec!["c", "d"]);
    }

    #[test]
    fn test_trailing_delimiter_keeps_empty_field() {
        assert_eq!(rows_of("a,"), vec![vec!["a", ""]]);
        assert_eq!(rows_of("a,\n"), vec![vec!["a", ""]]);
    }

    #[test]
    fn test_no_row_after_final_terminator() {
        assert_eq!(rows_of("a\n").len(), 1);
        assert!(rows_of("").is_empty());
    }

    #[test]
    fn test_empty_line_is_single_empty_field() {
        assert_eq!(rows_of("a\n\nb\n"), vec![vec!["a"], vec![""], vec!["b"]]);
    }

    #[test]
    fn test_quotes_kept_and_delimiters_inside_ignored() {
        assert_eq!(
            rows_of("a,\"b,c\",d\n"),
            vec![vec!["a", "\"b,c\"", "d"]]
        );
    }

    #[test]
    fn test_embedded_newline_in_quotes() {
        let text = "a,\"b\nc\",d\n";
        let set = Tokenizer::new(Dialect::standard(), 8).tokenize(text);
        assert_eq!(set.len(), 1);
        let view = set.view(0, text, b'"').unwrap();
        assert_eq!(view.unquoted(1).unwrap(), "b\nc");
        assert_eq!(view.line(), "a,\"b\nc\",d");
    }

    #[test]
    fn test_escaped_quotes_not_collapsed() {
        let text = "\"x\"\"y\",z\n";
        let set = Tokenizer::new(Dialect::standard(), 8).tokenize(text);
        let view = set.view(0, text, b'"').unwrap();
        assert_eq!(view.get(0), Some("\"x\"\"y\""));
        assert_eq!(view.unquoted(0).unwrap(), "x\"y");
        assert!(matches!(view.unquoted(1), Some(Cow::Borrowed("z"))));
    }

    #[test]
    fn test_width_limit_drops_extra_fields() {
        let tok = Tokenizer::new(Dialect::standard(), 2);
        let text = "a,b,c,d\ne,f\n";
        let set = tok.tokenize(text);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0].field_count(), 2);
        assert_eq!(set.truncated_rows(), 1);
        let first: Vec<&str> = set.view(0, text, b'"').unwrap().iter().collect();
        assert_eq!(first, vec!["a", "b"]);
        // Line span still covers the whole record
        assert_eq!(set.view(0, text, b'"').unwrap().line(), "a,b,c,d");
    }

    #[test]
    fn test_tokenize_complete_reports_consumed() {
        let tok = Tokenizer::new(Dialect::standard(), 8);
        let (set, consumed) = tok.tokenize_complete("a,b\nc,\"d\ne");
        assert_eq!(set.len(), 1);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_tab_dialect() {
        let tok = Tokenizer::new(Dialect::with_delimiter(b'\t'), 8);
        let text = "a\tb,c\n";
        let set = tok.tokenize(text);
        let fields: Vec<&str> = set.view(0, text, b'"').unwrap().iter().collect();
        assert_eq!(fields, vec!["a", "b,c"]);
    }

    #[test]
    fn test_multibyte_text_offsets() {
        let text = "grüß,größe\n";
        assert_eq!(rows_of(text), vec![vec!["grüß", "größe"]]);
    }
}
