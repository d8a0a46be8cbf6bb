//! Unified error handling for the InstaFram client
//!
//! Server rejections carry a structured [`ErrorCode`]; form routing and
//! notices match on the code, never on the human-readable message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Machine-readable error codes shared with the backend contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmailAlreadyExists,
    AliasAlreadyExists,
    EmailNotVerified,
    InvalidCredentials,
    InvalidOtp,
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidInput,
    Conflict,
    PayloadTooLarge,
    RateLimited,
    Internal,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Best-effort code for envelopes that carry no explicit `code`
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidInput,
            401 => Self::Unauthenticated,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            413 => Self::PayloadTooLarge,
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Form field this code belongs to, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::EmailAlreadyExists | Self::EmailNotVerified => Some("email"),
            Self::AliasAlreadyExists => Some("alias"),
            Self::InvalidCredentials => Some("password"),
            Self::InvalidOtp => Some("otp"),
            Self::PayloadTooLarge => Some("image"),
            _ => None,
        }
    }
}

/// Error type for every client-side operation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details")]
pub enum ApiError {
    /// Client-side rule violation; never reaches the network
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server answered with a non-success envelope
    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: ErrorCode,
        message: String,
    },

    /// Operation needs a signed-in user
    #[error("Not signed in")]
    Unauthenticated,

    /// Connection failed before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the configured deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Local persistence (the saved session) failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Build a rejection, deriving the code from the status when absent
    pub fn rejected(status: u16, code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            code: code.unwrap_or_else(|| ErrorCode::from_status(status)),
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, when one exists
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Unauthenticated => Some(401),
            Self::Timeout(_) => Some(504),
            _ => None,
        }
    }

    /// Structured code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidInput,
            Self::Rejected { code, .. } => *code,
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::Network(_) | Self::Timeout(_) => ErrorCode::Unavailable,
            Self::Decode(_) | Self::Storage(_) => ErrorCode::Internal,
        }
    }

    /// Whether offering a manual "try again" makes sense
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Rejected { code, .. } => {
                matches!(
                    code,
                    ErrorCode::Unavailable | ErrorCode::RateLimited | ErrorCode::Internal
                )
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
