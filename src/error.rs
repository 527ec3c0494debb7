//! Error types for the directive analysis core
//!
//! These errors describe misuse of the analysis API. Problems in the analysed
//! program are not errors: they are [`Diagnostic`](crate::Diagnostic) records
//! handed to a [`DiagnosticSink`](crate::DiagnosticSink).

use thiserror::Error;

/// Analysis core errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Attempt to pop the permanent bottom frame of the region stack
    ///
    /// **Triggered by:** a `pop` without a matching `push`
    #[error("Cannot pop the sentinel frame of the directive region stack")]
    PopSentinel,

    /// A handle does not belong to the arena it was used with
    #[error("Unknown {kind} handle: {index}")]
    UnknownHandle {
        /// Handle category (var, expr, stmt, scope)
        kind: &'static str,
        /// Raw handle index
        index: u32,
    },

    /// Statement was expected to be a directive
    #[error("Statement {index} is not a directive")]
    NotADirective {
        /// Raw statement index
        index: u32,
    },

    /// Configuration document could not be decoded
    #[error("Invalid analysis options: {0}")]
    InvalidOptions(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidOptions(err.to_string())
    }
}

/// Result type for analysis core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::PopSentinel.to_string(),
            "Cannot pop the sentinel frame of the directive region stack"
        );
        let err = Error::UnknownHandle {
            kind: "var",
            index: 7,
        };
        assert_eq!(err.to_string(), "Unknown var handle: 7");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }
}
