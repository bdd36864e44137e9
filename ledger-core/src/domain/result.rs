//! Result and error types for the core library

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shared by every authorization failure.
///
/// Unknown accounts and wrong PINs must read the same from the outside.
pub const AUTH_FAILURE_MESSAGE: &str = "invalid account number or PIN";

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("invalid account number or PIN")]
    Auth,

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    /// A compare-and-set lost against a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrency conflict: gave up after {attempts} attempts, retry the operation")]
    ConcurrencyConflict { attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(
        "Fatal inconsistency: {amount} debited from {from} was neither credited to {to} nor restored ({reason}); manual reconciliation required"
    )]
    FatalInconsistency {
        from: String,
        to: String,
        amount: Decimal,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a compare-and-set conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Taxonomy tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Json(_) => ErrorKind::Validation,
            Error::Auth | Error::NotFound(_) => ErrorKind::Auth,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::Conflict(_) | Error::ConcurrencyConflict { .. } => {
                ErrorKind::ConcurrencyConflict
            }
            Error::Storage(_) | Error::Io(_) | Error::Config(_) => ErrorKind::Storage,
            Error::FatalInconsistency { .. } => ErrorKind::FatalInconsistency,
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Stable, serializable error category handed to transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    InsufficientFunds,
    ConcurrencyConflict,
    Storage,
    FatalInconsistency,
}

impl ErrorKind {
    /// Suggested HTTP status for a transport that exposes the engine
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::InsufficientFunds | ErrorKind::ConcurrencyConflict => 409,
            ErrorKind::Storage => 503,
            ErrorKind::FatalInconsistency => 500,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    /// Create a failed result from an engine error
    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn test_from_result() {
        let err: Result<i32> = Err(Error::validation("bad input"));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Validation error"));
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    }

    #[test]
    fn test_auth_errors_share_one_message() {
        assert_eq!(Error::Auth.to_string(), AUTH_FAILURE_MESSAGE);
        assert_eq!(Error::not_found("123456").kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::validation("x").kind().http_status(), 400);
        assert_eq!(Error::Auth.kind().http_status(), 401);
        assert_eq!(
            Error::ConcurrencyConflict { attempts: 5 }.kind().http_status(),
            409
        );
        assert_eq!(Error::storage("down").kind().http_status(), 503);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InsufficientFunds).unwrap();
        assert_eq!(json, "\"insufficient_funds\"");
    }
}
