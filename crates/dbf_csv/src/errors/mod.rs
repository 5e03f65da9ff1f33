use thiserror::Error;

/// Broad classes of failure, used by callers to decide whether to abort the
/// whole run or only the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration, detected before any file is opened. Aborts the run.
    Configuration,
    /// The binary or text input is structurally broken. Aborts the current file.
    Format,
    /// Underlying I/O failure. Aborts the current file.
    Io,
}

/// Centralized error type for DBF/CSV conversion
#[derive(Error, Debug)]
pub enum XbaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("Invalid delimiter '{0}'")]
    InvalidDelimiter(String),

    #[error("Invalid quote character '{0}'")]
    InvalidQuote(String),

    #[error("Invalid line ending '{0}'")]
    InvalidLineEnding(String),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("No field terminator found within {limit} field descriptors")]
    MissingFieldTerminator { limit: usize },

    #[error("Truncated field descriptor #{index}")]
    TruncatedFieldDescriptor { index: usize },

    #[error("Truncated record #{index}: expected {expected} bytes, got {got}")]
    TruncatedRecord {
        index: u64,
        expected: usize,
        got: usize,
    },

    #[error("No fields found in CSV header")]
    NoFields,

    #[error("Schema too large: {0}")]
    SchemaTooLarge(String),

    #[error("Record count mismatch: header declares {declared}, wrote {written}")]
    RecordCountMismatch { declared: u32, written: u32 },
}

impl XbaseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            XbaseError::UnsupportedEncoding(_)
            | XbaseError::InvalidDelimiter(_)
            | XbaseError::InvalidQuote(_)
            | XbaseError::InvalidLineEnding(_) => ErrorCategory::Configuration,
            XbaseError::MalformedHeader(_)
            | XbaseError::MissingFieldTerminator { .. }
            | XbaseError::TruncatedFieldDescriptor { .. }
            | XbaseError::TruncatedRecord { .. }
            | XbaseError::NoFields
            | XbaseError::SchemaTooLarge(_)
            | XbaseError::RecordCountMismatch { .. } => ErrorCategory::Format,
            XbaseError::Io(_) | XbaseError::Csv(_) => ErrorCategory::Io,
        }
    }

    pub fn malformed_header<S: Into<String>>(msg: S) -> Self {
        Self::MalformedHeader(msg.into())
    }

    pub fn schema_too_large<S: Into<String>>(msg: S) -> Self {
        Self::SchemaTooLarge(msg.into())
    }
}

/// Alias for fallible operations in the dbf_csv crate
pub type XbaseResult<T> = Result<T, XbaseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let errors = vec![
            XbaseError::UnsupportedEncoding("latin-9".to_string()),
            XbaseError::InvalidDelimiter("".to_string()),
            XbaseError::MalformedHeader("header length 12".to_string()),
            XbaseError::MissingFieldTerminator { limit: 4096 },
            XbaseError::TruncatedFieldDescriptor { index: 3 },
            XbaseError::TruncatedRecord { index: 7, expected: 21, got: 4 },
            XbaseError::NoFields,
            XbaseError::RecordCountMismatch { declared: 2, written: 3 },
        ];

        for err in errors {
            let display_str = format!("{err}");
            assert!(!display_str.is_empty(), "Error display should not be empty");
        }
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            XbaseError::UnsupportedEncoding("koi8".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            XbaseError::InvalidDelimiter("ab".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            XbaseError::malformed_header("too short").category(),
            ErrorCategory::Format
        );
        assert_eq!(XbaseError::NoFields.category(), ErrorCategory::Format);

        let io_err: XbaseError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert_eq!(io_err.category(), ErrorCategory::Io);
        assert!(matches!(io_err, XbaseError::Io(_)));
    }

    #[test]
    fn test_error_helper_functions() {
        let err = XbaseError::malformed_header("bad header");
        assert!(matches!(err, XbaseError::MalformedHeader(msg) if msg == "bad header"));

        let err = XbaseError::schema_too_large("too many fields");
        assert!(matches!(err, XbaseError::SchemaTooLarge(msg) if msg == "too many fields"));
    }
}
