//! Unified error types for the roaster core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! session manager's error handling uniform.  Each variant carries a
//! stable machine code (see [`Error::code`]) so the remote tool-call layer
//! can map failures into its own format without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RoastEventKind;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible public operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Hardware unreachable, disconnected, or the transport failed.
    #[error("connection error: {0}")]
    Connection(String),
    /// Out-of-range or mis-stepped control value, malformed timestamp,
    /// or an event that would break `T0 <= first_crack <= drop`.
    #[error("validation error: {0}")]
    Validation(String),
    /// A command or query arrived while no session is running.
    #[error("no active session")]
    NoActiveSession,
    /// A write-once roast event was reported a second time.
    #[error("{0} already reported")]
    AlreadyReported(RoastEventKind),
    /// The polling thread died or exceeded the consecutive error budget.
    #[error("polling thread unhealthy: {0}")]
    ThreadHealth(String),
}

impl Error {
    /// Stable code for the wire.  Never rename these.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::AlreadyReported(_) => "ALREADY_REPORTED",
            Self::ThreadHealth(_) => "THREAD_HEALTH_ERROR",
        }
    }

    pub(crate) fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Structured form handed across the core boundary.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable `{code, message}` pair for the remote tool-call layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors from configuration parsing and range validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Validation(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
