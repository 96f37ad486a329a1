use crate::protocol::types::{LogicalType, NativeType};
use thiserror::Error;

/// Error category for decision-making (branch on capability, harvest partial results, abort)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid user input or a value that does not fit the requested kind
    Validation,
    /// Operation issued in the wrong lifecycle state
    State,
    /// The native engine call failed
    Native,
    /// Some statements of a batch failed; results of the others remain readable
    Partial,
    /// Not recoverable at this call site
    Fatal,
}

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Type mismatch: cannot read {native:?} as {requested:?}{detail}")]
    TypeMismatch {
        requested: LogicalType,
        native: NativeType,
        detail: String,
    },

    #[error("Can't convert NULL data (column {column})")]
    NullConversion { column: usize },

    #[error("Native error {code}: {message}")]
    Native { code: i32, message: String },

    #[error("Failed to execute {failed} command(s): {message}")]
    BatchFailure { failed: usize, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection limit reached: {max} connection(s) already open")]
    ConnectionLimit { max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message) => DbError::Native {
                code: code.extended_code,
                message: message.unwrap_or_else(|| code.to_string()),
            },
            other => DbError::Native {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

impl From<odbc_api::Error> for DbError {
    fn from(err: odbc_api::Error) -> Self {
        use odbc_api::Error as OdbcErr;
        match &err {
            OdbcErr::Diagnostics { record, .. } => DbError::Native {
                code: record.native_error,
                message: record.to_string(),
            },
            _ => DbError::Native {
                code: -1,
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl DbError {
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        DbError::Native {
            code,
            message: message.into(),
        }
    }

    pub fn mismatch(requested: LogicalType, native: NativeType) -> Self {
        DbError::TypeMismatch {
            requested,
            native,
            detail: String::new(),
        }
    }

    pub fn mismatch_with(requested: LogicalType, native: NativeType, detail: impl Into<String>) -> Self {
        DbError::TypeMismatch {
            requested,
            native,
            detail: format!(" ({})", detail.into()),
        }
    }

    pub fn lock_poisoned() -> Self {
        DbError::Internal("Lock poisoned".to_string())
    }

    pub fn native_code(&self) -> i32 {
        match self {
            DbError::Native { code, .. } => *code,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DbError::Native { message, .. } | DbError::BatchFailure { message, .. } => {
                message.clone()
            }
            _ => self.to_string(),
        }
    }

    pub fn is_batch_failure(&self) -> bool {
        matches!(self, DbError::BatchFailure { .. })
    }

    /// Number of failed sub-statements carried by a batch failure
    pub fn failed_count(&self) -> usize {
        match self {
            DbError::BatchFailure { failed, .. } => *failed,
            _ => 0,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, DbError::Unsupported(_))
    }

    pub fn error_category(&self) -> ErrorCategory {
        match self {
            DbError::TypeMismatch { .. }
            | DbError::NullConversion { .. }
            | DbError::Validation(_)
            | DbError::Config(_) => ErrorCategory::Validation,
            DbError::InvalidState(_) | DbError::ConnectionLimit { .. } => ErrorCategory::State,
            DbError::Native { .. } => ErrorCategory::Native,
            DbError::BatchFailure { .. } => ErrorCategory::Partial,
            DbError::Unsupported(_) | DbError::Internal(_) => ErrorCategory::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
