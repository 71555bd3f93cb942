//! Error taxonomy for driver operations.
//!
//! Every engine failure is translated at the driver boundary into a
//! [`SqlError`]: a category tag, a human-readable category message, the
//! engine's own error text and, when available, the engine's numeric code.

use thiserror::Error;

/// Category of a [`SqlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Open/close failures, wrong password, fetch failures.
    Connection,
    /// Prepare, reset, bind and parameter-count failures.
    Statement,
    /// `BEGIN` / `COMMIT` / `ROLLBACK` failures.
    Transaction,
}

/// An error reported by a driver.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{ErrorKind, SqlError};
///
/// let err = SqlError::statement("Unable to execute statement", "near \"SELEC\": syntax error")
///     .with_code(1);
/// assert_eq!(err.kind, ErrorKind::Statement);
/// assert_eq!(err.code, Some(1));
/// assert_eq!(
///     err.to_string(),
///     "Unable to execute statement: near \"SELEC\": syntax error"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", detail_suffix(.database_text))]
pub struct SqlError {
    /// Taxonomy tag.
    pub kind: ErrorKind,
    /// Category message written by the driver (e.g. "Unable to fetch row").
    pub message: String,
    /// Error text reported by the engine; empty when the failure is the
    /// driver's own.
    pub database_text: String,
    /// Engine result code, if the failure came from the engine.
    pub code: Option<i32>,
}

impl SqlError {
    /// Creates an error of the given kind without an engine code.
    pub fn new(kind: ErrorKind, message: impl Into<String>, database_text: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            database_text: database_text.into(),
            code: None,
        }
    }

    /// Shorthand for an [`ErrorKind::Connection`] error.
    pub fn connection(message: impl Into<String>, database_text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message, database_text)
    }

    /// Shorthand for an [`ErrorKind::Statement`] error.
    pub fn statement(message: impl Into<String>, database_text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Statement, message, database_text)
    }

    /// Shorthand for an [`ErrorKind::Transaction`] error.
    pub fn transaction(message: impl Into<String>, database_text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transaction, message, database_text)
    }

    /// Attaches the engine's numeric result code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

fn detail_suffix(database_text: &str) -> String {
    if database_text.is_empty() {
        String::new()
    } else {
        format!(": {database_text}")
    }
}

/// Convenience alias for results with [`SqlError`].
pub type Result<T> = std::result::Result<T, SqlError>;
