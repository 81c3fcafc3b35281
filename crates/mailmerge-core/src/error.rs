//! Error types for the mail-merge engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in core operations.
///
/// Every variant here ends the run. Per-recipient delivery failures are
/// counted by the dispatcher and never surface as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP session setup or teardown failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailmerge_smtp::Error),

    /// A recipient or template file could not be read.
    #[error("Cannot read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The recipient list is not valid CSV or lacks a required column.
    #[error("Recipient list error: {0}")]
    Csv(#[from] csv::Error),

    /// The template could not be parsed or rendered.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Template parse and render failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// An action is unterminated or not a `.Field` reference.
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based line of the offending action.
        line: usize,
        /// What is wrong.
        message: String,
    },

    /// The template references a field the record does not have.
    #[error("line {line}: can't evaluate field {field}")]
    UnknownField {
        /// 1-based line of the reference.
        line: usize,
        /// Field name without the leading dot.
        field: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
