//! Error types for the status server
//!
//! This module provides the crate-wide error enum, machine-readable error codes
//! and structured logging of errors that are recovered locally (poll cycles,
//! event callbacks) instead of being returned to a caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for status server operations
pub type Result<T> = std::result::Result<T, StatusServerError>;

/// Error types for status server operations
#[derive(Error, Debug)]
pub enum StatusServerError {
    /// Remote client errors (read/write/subscribe failures)
    #[error("Client error: {0}")]
    Client(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source could not be loaded
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Unknown attribute, device or client
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Client errors (1000-1099)
    ClientReadFailed,
    ClientTimeout,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,
    ConfigurationMissing,

    // Lookup errors (1300-1399)
    AttributeNotFound,

    // Data errors (1400-1499)
    InvalidInput,
    DataCorrupted,

    // State errors (1500-1599)
    InvalidState,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ClientReadFailed => 1001,
            ErrorCode::ClientTimeout => 1002,
            ErrorCode::ConfigurationInvalid => 1201,
            ErrorCode::ConfigurationMissing => 1202,
            ErrorCode::AttributeNotFound => 1301,
            ErrorCode::InvalidInput => 1401,
            ErrorCode::DataCorrupted => 1402,
            ErrorCode::InvalidState => 1501,
            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "client",
            1200..=1299 => "configuration",
            1300..=1399 => "lookup",
            1400..=1499 => "data",
            1500..=1599 => "state",
            _ => "internal",
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Where an error happened, attached to structured log events
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl StatusServerError {
    /// Create a client error
    pub fn client<S: Into<String>>(msg: S) -> Self {
        Self::Client(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map to a structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            StatusServerError::Client(_) => ErrorCode::ClientReadFailed,
            StatusServerError::Timeout(_) => ErrorCode::ClientTimeout,
            StatusServerError::Config(_) => ErrorCode::ConfigurationInvalid,
            StatusServerError::ConfigLoad(_) | StatusServerError::Io(_) => {
                ErrorCode::ConfigurationMissing
            }
            StatusServerError::NotFound(_) => ErrorCode::AttributeNotFound,
            StatusServerError::InvalidInput(_) => ErrorCode::InvalidInput,
            StatusServerError::Json(_) => ErrorCode::DataCorrupted,
            StatusServerError::InvalidState(_) => ErrorCode::InvalidState,
            StatusServerError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Severity used when the error is logged instead of returned
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StatusServerError::Client(_) | StatusServerError::Timeout(_) => ErrorSeverity::Warning,
            StatusServerError::InvalidInput(_) | StatusServerError::InvalidState(_) => {
                ErrorSeverity::Info
            }
            StatusServerError::Generic(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether the failed operation may succeed when simply repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatusServerError::Client(_) | StatusServerError::Timeout(_) | StatusServerError::Io(_)
        )
    }
}

/// Error logging utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log an error with the severity it maps to
    pub fn log_error(error: &StatusServerError, context: Option<ErrorContext>) {
        let code = error.to_error_code();
        let context = context.unwrap_or_else(|| ErrorContext::new(code, "unknown", "unknown"));
        let metadata = serde_json::to_string(&context.metadata).unwrap_or_default();

        match error.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!(
                    error_code = code.as_number(),
                    category = code.category(),
                    component = %context.component,
                    operation = %context.operation,
                    retryable = error.is_retryable(),
                    metadata = %metadata,
                    "Error occurred: {}",
                    error
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error_code = code.as_number(),
                    category = code.category(),
                    component = %context.component,
                    operation = %context.operation,
                    retryable = error.is_retryable(),
                    metadata = %metadata,
                    "Warning: {}",
                    error
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error_code = code.as_number(),
                    category = code.category(),
                    component = %context.component,
                    operation = %context.operation,
                    "Info: {}",
                    error
                );
            }
        }
    }

    /// JSON body describing a rejected command
    pub fn format_api_error(error: &StatusServerError) -> serde_json::Value {
        let code = error.to_error_code();
        serde_json::json!({
            "error": {
                "code": code.as_number(),
                "category": code.category(),
                "message": error.to_string(),
                "retryable": error.is_retryable(),
            }
        })
    }
}

/// Macro for easy structured error logging
#[macro_export]
macro_rules! log_structured_error {
    ($error:expr, $component:expr, $operation:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some($crate::error::ErrorContext::new(
                $error.to_error_code(),
                $component,
                $operation,
            )),
        )
    };
    ($error:expr, $component:expr, $operation:expr, $attribute:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some(
                $crate::error::ErrorContext::new($error.to_error_code(), $component, $operation)
                    .with_metadata("attribute", $attribute),
            ),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_categories() {
        let err = StatusServerError::client("device offline");
        assert_eq!(err.to_error_code(), ErrorCode::ClientReadFailed);
        assert_eq!(err.to_error_code().category(), "client");
        assert!(err.is_retryable());

        let err = StatusServerError::not_found("sim/dev/missing");
        assert_eq!(err.to_error_code().as_number(), 1301);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_format_api_error() {
        let err = StatusServerError::invalid_input("delay must be positive");
        let json = ErrorReporter::format_api_error(&err);
        assert_eq!(json["error"]["code"], 1401);
        assert_eq!(json["error"]["category"], "data");
        assert_eq!(json["error"]["retryable"], false);
    }
}
