//! Error types for the SQLCipher driver.
//!
//! Engine failures are reported as [`SqlError`]; this module adds the option
//! parsing error and the translation from raw engine failures.

use cipher_sql_core::{ErrorKind, SqlError};
use thiserror::Error;

use crate::ffi::EngineError;

/// Errors reported by [`ConnectOptions::parse_strict`](crate::ConnectOptions::parse_strict).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// The token names no known option.
    #[error("unknown connection option '{0}'")]
    UnknownOption(String),

    /// The option takes a value that could not be parsed.
    #[error("invalid value '{value}' for connection option '{option}'")]
    InvalidValue { option: String, value: String },

    /// A flag option was given a value.
    #[error("connection option '{0}' does not take a value")]
    UnexpectedValue(String),
}

/// Translates an engine failure into the driver's error taxonomy.
pub(crate) fn engine_error(kind: ErrorKind, message: &str, err: EngineError) -> SqlError {
    SqlError::new(kind, message, err.message).with_code(err.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_keeps_code_and_text() {
        let raw = EngineError {
            code: 26,
            message: "file is not a database".to_string(),
        };
        let err = engine_error(ErrorKind::Connection, "Incorrect password", raw);
        assert_eq!(err.kind, ErrorKind::Connection);
        assert_eq!(err.code, Some(26));
        assert_eq!(err.to_string(), "Incorrect password: file is not a database");
    }

    #[test]
    fn test_options_error_messages() {
        let err = OptionsError::InvalidValue {
            option: "BUSY_TIMEOUT".into(),
            value: "soon".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value 'soon' for connection option 'BUSY_TIMEOUT'"
        );
    }
}
