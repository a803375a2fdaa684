//! Custom error types for the expense tracker
//!
//! This module defines the error hierarchy for the client using thiserror.
//! Errors are `Clone` because a single failed fetch is delivered to every
//! caller that joined it, so foreign errors are captured as strings.

use thiserror::Error;

/// The main error type for expense tracker operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpenseError {
    /// Client-side validation failed; nothing was sent to the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend rejected the bearer credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Interactive login did not produce a session
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// The owning view went away before the result was delivered
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Local storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExpenseError {
    /// Create a "not found" error for expense items
    pub fn expense_item_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Expense item",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for expense periods
    pub fn expense_period_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Expense period",
            identifier: identifier.into(),
        }
    }

    /// Check if the backend rejected the credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Check if this error only signals that the caller went away
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for ExpenseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExpenseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<reqwest::Error> for ExpenseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Json(err.to_string());
        }
        match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => {
                Self::Unauthorized(err.to_string())
            }
            Some(status) => Self::Server {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

/// Result type alias for expense tracker operations
pub type ExpenseResult<T> = Result<T, ExpenseError>;
