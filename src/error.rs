// src/error.rs

//! Unified error handling for the curator.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for curator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Exit code for a fatal error that aborted the run.
pub const EXIT_FATAL: i32 = 2;

/// Exit code when another instance already holds the run lock.
pub const EXIT_BUSY: i32 = 3;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed before a response was classified
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Feed XML could not be parsed
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Timeout, rate limit or server-side failure. Safe to retry.
    #[error("Transient remote error during {operation}: {message}")]
    TransientRemote { operation: String, message: String },

    /// Rejected request. Retrying will not help.
    #[error("Remote error during {operation} (status {status}): {body}")]
    PermanentRemote {
        operation: String,
        status: u16,
        body: String,
    },

    /// State file exists but cannot be parsed
    #[error("State file {path} is corrupt: {message}")]
    CorruptState { path: String, message: String },

    /// Another run holds the lock for this state file
    #[error("Already running: lock {path} is held ({holder})")]
    LockContention { path: String, holder: String },

    /// No stable identity could be derived for an item
    #[error("Identity extraction failed: {message}")]
    IdentityExtraction { message: String },

    /// A source could not produce its candidate list
    #[error("Source error for {source_name}: {message}")]
    Source {
        source_name: String,
        message: String,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transient remote error.
    pub fn transient(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::TransientRemote {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a permanent remote error.
    pub fn permanent(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::PermanentRemote {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a corrupt state error for the given file.
    pub fn corrupt_state(path: &Path, message: impl fmt::Display) -> Self {
        Self::CorruptState {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a lock contention error for the given lock file.
    pub fn lock_contention(path: &Path, holder: impl Into<String>) -> Self {
        Self::LockContention {
            path: path.display().to_string(),
            holder: holder.into(),
        }
    }

    /// Create an identity extraction error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::IdentityExtraction {
            message: message.into(),
        }
    }

    /// Create a source error with context.
    pub fn source(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientRemote { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Process exit code for a run aborted by this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LockContention { .. } => EXIT_BUSY,
            _ => EXIT_FATAL,
        }
    }
}
