//! Raw source records and the schema they are validated against.
//!
//! A source row is converted into a [`RawRecord`] through an explicit mapping step:
//! the row's columns must match the [`RecordSchema`] of the source exactly, so a
//! source whose columns were added, removed or renamed fails fast instead of
//! flowing through the pipeline with an unexpected shape.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while converting a source row into a [`RawRecord`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// The row is not valid JSON.
    #[error("Malformed record at position {ordinal}: {reason}")]
    Malformed { ordinal: u64, reason: String },

    /// The row is valid JSON but not an object.
    #[error("Record at position {ordinal} is not an object")]
    NotAnObject { ordinal: u64 },

    /// The row's columns do not match the source schema.
    #[error(
        "Schema mismatch at position {ordinal}: missing columns {missing:?}, unexpected columns {unexpected:?}"
    )]
    SchemaMismatch {
        ordinal: u64,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl RecordError {
    /// Create a malformed record error.
    pub fn malformed(ordinal: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            ordinal,
            reason: reason.into(),
        }
    }
}

/// The fixed set of columns a record source is expected to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    columns: Vec<String>,
}

impl RecordSchema {
    /// Create a schema from an ordered list of column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// The column names, in source order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the schema declares the given column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Check that a row carries exactly the schema's columns.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If no column is missing and no unexpected column is present
    /// * `Err(RecordError::SchemaMismatch)` - Listing the offending columns otherwise
    pub fn validate(&self, ordinal: u64, row: &Map<String, Value>) -> Result<(), RecordError> {
        let missing: Vec<String> = self
            .columns
            .iter()
            .filter(|column| !row.contains_key(column.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = row
            .keys()
            .filter(|key| !self.contains(key))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(RecordError::SchemaMismatch {
                ordinal,
                missing,
                unexpected,
            })
        }
    }
}

/// One row of the record source.
///
/// Records are immutable once constructed. `ordinal` is the zero-based position
/// of the row in its source and identifies the record in errors when its
/// identifier field cannot be read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    ordinal: u64,
    fields: Map<String, Value>,
}

impl RawRecord {
    /// Build a record from an already-decoded row, validating it against `schema`.
    pub fn from_row(
        schema: &RecordSchema,
        ordinal: u64,
        row: Map<String, Value>,
    ) -> Result<Self, RecordError> {
        schema.validate(ordinal, &row)?;
        Ok(Self {
            ordinal,
            fields: row,
        })
    }

    /// Parse one JSON-lines row and validate it against `schema`.
    pub fn from_json_line(
        schema: &RecordSchema,
        ordinal: u64,
        line: &str,
    ) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| RecordError::malformed(ordinal, e.to_string()))?;
        match value {
            Value::Object(row) => Self::from_row(schema, ordinal, row),
            _ => Err(RecordError::NotAnObject { ordinal }),
        }
    }

    /// Position of the row in its source.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Raw value of a field, including explicit nulls.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value of a field, treating an explicit `null` as absent.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// String value of a field. `None` for absent, null or non-string values.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// All fields in source order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
