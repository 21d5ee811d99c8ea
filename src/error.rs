//! Unified error type for the urlake library.
//!
//! This module provides a structured error type that captures all failure
//! modes in the library with appropriate context. Library code uses
//! `UrlakeError` while CLI code continues using `anyhow::Result` for
//! convenience.
//!
//! # Error Categories
//!
//! - **Io**: File system operations (open, read, write, rename)
//! - **Format**: Invalid artifact format (magic bytes, version mismatch,
//!   truncated data)
//! - **Validation**: Invalid input (unusable URL, bad query argument,
//!   bad configuration)
//! - **VersionMissing**: No published index version, or the manifest points
//!   at a version that does not exist on disk
//! - **Parquet**: Parquet/Arrow errors (schema, encoding)
//! - **Encoding**: Varint or payload encoding errors
//! - **Overflow**: ID space or size limit exceeded

use std::fmt;
use std::path::PathBuf;

/// Unified error type for the urlake library.
#[derive(Debug)]
pub enum UrlakeError {
    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
    },

    /// Invalid artifact format (magic bytes, version, structure).
    Format { path: PathBuf, detail: String },

    /// Validation error (unusable URL, invalid parameters).
    Validation(String),

    /// No usable index version.
    VersionMissing(String),

    /// Parquet/Arrow error.
    Parquet {
        context: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Encoding/decoding error (varint payloads).
    Encoding(String),

    /// Numeric overflow or size limit exceeded.
    Overflow {
        context: String,
        limit: u64,
        actual: u64,
    },
}

impl fmt::Display for UrlakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlakeError::Io {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "I/O error during {} on '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
            UrlakeError::Format { path, detail } => {
                write!(f, "Invalid format in '{}': {}", path.display(), detail)
            }
            UrlakeError::Validation(msg) => write!(f, "Validation error: {}", msg),
            UrlakeError::VersionMissing(msg) => write!(f, "No usable index version: {}", msg),
            UrlakeError::Parquet { context, source } => {
                if let Some(src) = source {
                    write!(f, "Parquet error ({}): {}", context, src)
                } else {
                    write!(f, "Parquet error: {}", context)
                }
            }
            UrlakeError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            UrlakeError::Overflow {
                context,
                limit,
                actual,
            } => {
                write!(
                    f,
                    "Overflow in {}: limit is {}, got {}",
                    context, limit, actual
                )
            }
        }
    }
}

impl std::error::Error for UrlakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UrlakeError::Io { source, .. } => Some(source),
            UrlakeError::Parquet {
                source: Some(s), ..
            } => Some(s.as_ref()),
            _ => None,
        }
    }
}

// ============================================================================
// Conversion traits
// ============================================================================

impl From<std::io::Error> for UrlakeError {
    fn from(err: std::io::Error) -> Self {
        UrlakeError::Io {
            path: PathBuf::new(),
            operation: "unknown",
            source: err,
        }
    }
}

impl From<parquet::errors::ParquetError> for UrlakeError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        UrlakeError::Parquet {
            context: "parquet operation".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<arrow::error::ArrowError> for UrlakeError {
    fn from(err: arrow::error::ArrowError) -> Self {
        UrlakeError::Parquet {
            context: "arrow operation".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for UrlakeError {
    fn from(err: serde_json::Error) -> Self {
        UrlakeError::Format {
            path: PathBuf::new(),
            detail: format!("JSON: {}", err),
        }
    }
}

/// Convenience type alias for Results using UrlakeError.
pub type Result<T> = std::result::Result<T, UrlakeError>;

// ============================================================================
// Helper constructors
// ============================================================================

impl UrlakeError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        UrlakeError::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a format error.
    pub fn format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        UrlakeError::Format {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        UrlakeError::Validation(msg.into())
    }

    /// Create a version-missing error.
    pub fn version_missing(msg: impl Into<String>) -> Self {
        UrlakeError::VersionMissing(msg.into())
    }

    /// Create a Parquet error without source.
    pub fn parquet(context: impl Into<String>) -> Self {
        UrlakeError::Parquet {
            context: context.into(),
            source: None,
        }
    }

    /// Create an encoding error.
    pub fn encoding(msg: impl Into<String>) -> Self {
        UrlakeError::Encoding(msg.into())
    }

    /// Create an overflow error.
    pub fn overflow(context: impl Into<String>, limit: u64, actual: u64) -> Self {
        UrlakeError::Overflow {
            context: context.into(),
            limit,
            actual,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = UrlakeError::io(
            "/data/urls/part-00000.parquet",
            "read",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/urls/part-00000.parquet"));
        assert!(msg.contains("read"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_format_error_display() {
        let err = UrlakeError::format("/data/index/v1/domains.mphf", "invalid magic bytes");
        let msg = err.to_string();
        assert!(msg.contains("domains.mphf"));
        assert!(msg.contains("invalid magic bytes"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = UrlakeError::validation("URL has no host");
        assert!(err.to_string().contains("URL has no host"));
    }

    #[test]
    fn test_overflow_error_display() {
        let err = UrlakeError::overflow("dataset ids", u32::MAX as u64, u32::MAX as u64 + 1);
        let msg = err.to_string();
        assert!(msg.contains("dataset ids"));
        assert!(msg.contains("4294967295"));
    }

    #[test]
    fn test_error_source_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = UrlakeError::io("/path", "open", io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
