use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures at the edges of the crate: reading input and parsing configuration.
/// Everything inside the analysis pipeline reports problems as [`Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum EdaError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EdaError>;

/// A section-scoped problem surfaced alongside whatever partial result the section produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An expected column is absent; the dependent output is omitted.
    MissingColumn { section: String, column: String },

    /// Rows whose fiscal-period label did not match the expected pattern.
    ParseFailure { column: String, rows: usize },

    /// A filter matched zero rows. Not the same thing as a zero sum.
    EmptyFilterResult { view: String, filter: String },

    /// Rows excluded from a numeric aggregate because the cell was not a number.
    InvalidNumeric {
        section: String,
        column: String,
        rows: usize,
    },
}

impl Diagnostic {
    pub fn missing_column(section: &str, column: &str) -> Self {
        Diagnostic::MissingColumn {
            section: section.to_string(),
            column: column.to_string(),
        }
    }

    pub fn invalid_numeric(section: &str, column: &str, rows: usize) -> Self {
        Diagnostic::InvalidNumeric {
            section: section.to_string(),
            column: column.to_string(),
            rows,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::MissingColumn { section, column } => {
                write!(f, "[{}] column '{}' not found in dataset", section, column)
            }
            Diagnostic::ParseFailure { column, rows } => {
                write!(f, "{} row(s) of '{}' could not be parsed", rows, column)
            }
            Diagnostic::EmptyFilterResult { view, filter } => {
                write!(f, "[{}] filter {} matched no rows", view, filter)
            }
            Diagnostic::InvalidNumeric {
                section,
                column,
                rows,
            } => write!(
                f,
                "[{}] {} row(s) excluded: non-numeric value in '{}'",
                section, rows, column
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::missing_column("reconciliation", "Evergreen.[Evergreen]");
        assert_eq!(
            diag.to_string(),
            "[reconciliation] column 'Evergreen.[Evergreen]' not found in dataset"
        );
    }

    #[test]
    fn test_diagnostic_serializes_tagged() {
        let diag = Diagnostic::invalid_numeric("aggregation", "Sales (Units)", 3);
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "invalid_numeric");
        assert_eq!(json["rows"], 3);
    }
}
