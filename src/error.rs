//! Error types for loading, formatting and configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A required field is missing or a typed field could not be parsed.
    ///
    /// `row` is the physical CSV line (header is row 1) or the 1-based
    /// position of a session in a JSON export.
    #[error("malformed input at row {row}, column '{column}': {reason}")]
    MalformedInput {
        row: u64,
        column: String,
        reason: String,
    },

    /// The source value is not one of the recognized support channels.
    #[error("unknown source '{value}' at row {row}")]
    UnknownSource { row: u64, value: String },

    /// A table was built from rows whose width does not match its columns.
    #[error("shape mismatch in row {row}: expected {expected} values, found {found}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub(crate) fn malformed(row: u64, column: &str, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            row,
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A configuration field has an invalid value.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Figment(Box::new(error))
    }
}

pub type Result<T, E = AnalyticsError> = std::result::Result<T, E>;
