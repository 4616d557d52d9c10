// Row validation
//
// A validator reads a row through its field offsets and returns the problems
// it found. It never mutates the row and never fails the chunk: problems are
// attached to the chunk result as data.
//
// `SchemaValidator` checks per-column rules (length, pattern, boolean,
// decimal, ISO-8601 date-time, allowed values). Where the rules come from is
// up to the caller; `ColumnRule` is serde-deserializable so a schema document
// can be mapped onto it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::core::{RowSet, RowView};
use crate::error::SchemaError;

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap());

/// What was wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("missing field")]
    Missing,
    #[error("length {actual} exceeds {max}")]
    TooLong { max: usize, actual: usize },
    #[error("does not match pattern")]
    PatternMismatch,
    #[error("not a boolean")]
    NotBoolean,
    #[error("not a decimal")]
    NotDecimal,
    #[error("not an ISO-8601 date-time")]
    NotDateTime,
    #[error("not an allowed value")]
    NotAllowed,
}

/// One validation problem, located by chunk-local row index and column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for field at index {column} in row {row}: {value:?} ({violation})")]
pub struct ValidationError {
    pub row: usize,
    pub column: usize,
    pub violation: Violation,
    pub value: String,
}

/// Validates rows of a parsed chunk. Shared across worker threads.
pub trait RowValidator: Send + Sync {
    fn validate(&self, row: &RowView<'_>) -> Vec<ValidationError>;
}

impl<F> RowValidator for F
where
    F: Fn(&RowView<'_>) -> Vec<ValidationError> + Send + Sync,
{
    fn validate(&self, row: &RowView<'_>) -> Vec<ValidationError> {
        self(row)
    }
}

/// Run `validator` over every row of a chunk.
pub fn validate_rows(
    validator: &dyn RowValidator,
    rows: &RowSet,
    text: &str,
    quote: u8,
) -> Vec<ValidationError> {
    rows.iter(text, quote)
        .flat_map(|row| validator.validate(&row))
        .collect()
}

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    String {
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        pattern: Option<String>,
    },
    Boolean,
    Decimal,
    DateTime,
    /// No type check; only presence and allowed values apply.
    Any,
}

/// Constraint for the field at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub index: usize,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ColumnType,
    /// Enumerated values; checked after the type.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    /// Whether a missing field is reported.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ColumnRule {
    pub fn new(index: usize, kind: ColumnType) -> Self {
        ColumnRule {
            index,
            name: None,
            kind,
            allowed: None,
            required: true,
        }
    }

    pub fn string(index: usize) -> Self {
        Self::new(
            index,
            ColumnType::String {
                max_length: None,
                pattern: None,
            },
        )
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

struct CompiledRule {
    rule: ColumnRule,
    pattern: Option<Regex>,
    allowed: Option<HashSet<String>>,
}

impl CompiledRule {
    fn check(&self, value: &str) -> Option<Violation> {
        match &self.rule.kind {
            ColumnType::String { max_length, .. } => {
                if let Some(max) = *max_length {
                    let actual = value.chars().count();
                    if actual > max {
                        return Some(Violation::TooLong { max, actual });
                    }
                }
                if let Some(re) = &self.pattern {
                    if !re.is_match(value) {
                        return Some(Violation::PatternMismatch);
                    }
                }
            }
            ColumnType::Boolean => {
                if !value.eq_ignore_ascii_case("true") && !value.eq_ignore_ascii_case("false") {
                    return Some(Violation::NotBoolean);
                }
            }
            ColumnType::Decimal => {
                if !DECIMAL.is_match(value) {
                    return Some(Violation::NotDecimal);
                }
            }
            ColumnType::DateTime => {
                if !DATE_TIME.is_match(value) {
                    return Some(Violation::NotDateTime);
                }
            }
            ColumnType::Any => {}
        }
        match &self.allowed {
            Some(set) if !set.contains(value) => Some(Violation::NotAllowed),
            _ => None,
        }
    }
}

/// Validator built from per-column rules. Patterns are compiled once.
pub struct SchemaValidator {
    /// Indexed by column; `None` for columns without a rule.
    columns: Vec<Option<CompiledRule>>,
}

impl SchemaValidator {
    pub fn new<I>(rules: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = ColumnRule>,
    {
        let mut columns: Vec<Option<CompiledRule>> = Vec::new();
        for rule in rules {
            let index = rule.index;
            if columns.len() <= index {
                columns.resize_with(index + 1, || None);
            }
            if columns[index].is_some() {
                return Err(SchemaError::DuplicateColumn(index));
            }
            let pattern = match &rule.kind {
                ColumnType::String {
                    pattern: Some(p), ..
                } => Some(
                    // Whole-value match
                    Regex::new(&format!("^(?:{p})$"))
                        .map_err(|source| SchemaError::Pattern { index, source })?,
                ),
                _ => None,
            };
            let allowed = rule
                .allowed
                .as_ref()
                .map(|values| values.iter().cloned().collect());
            columns[index] = Some(CompiledRule {
                rule,
                pattern,
                allowed,
            });
        }
        Ok(SchemaValidator { columns })
    }

    /// Build from a JSON array of `ColumnRule`s.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let rules: Vec<ColumnRule> = serde_json::from_str(json)?;
        Self::new(rules)
    }

    /// Number of columns covered, including gaps without rules.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rule(&self, index: usize) -> Option<&ColumnRule> {
        self.columns.get(index)?.as_ref().map(|c| &c.rule)
    }
}

impl RowValidator for SchemaValidator {
    fn validate(&self, row: &RowView<'_>) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (column, compiled) in self.columns.iter().enumerate() {
            let Some(compiled) = compiled else { continue };
            match row.unquoted(column) {
                Some(value) => {
                    if let Some(violation) = compiled.check(&value) {
                        errors.push(ValidationError {
                            row: row.index(),
                            column,
                            violation,
                            value: value.into_owned(),
                        });
                    }
                }
                None if compiled.rule.required => errors.push(ValidationError {
                    row: row.index(),
                    column,
                    violation: Violation::Missing,
                    value: String::new(),
                }),
                None => {}
            }
        }
        errors
    }
}
