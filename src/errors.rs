//! Error types for remote calls, configuration and state persistence

use serde::{Deserialize, Serialize};

/// Terminal failure code surfaced to the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerErrorCode {
    /// The resource does not exist
    NotFound,
    /// A resource with the same identity already exists
    AlreadyExists,
    /// The request was rejected as malformed or invalid
    InvalidRequest,
    /// The resource is in a state that conflicts with the request
    ResourceConflict,
    /// An account or service quota was hit
    ServiceLimitExceeded,
    /// The caller is not authorized for the primary operation
    AccessDenied,
    /// The caller is not authorized to tag with platform-managed tags
    UnauthorizedTaggingOperation,
    /// The remote API throttled the request
    Throttling,
    /// The resource never converged to the target state
    NotStabilized,
    /// Unexpected or unclassified fault
    InternalFailure,
}

impl HandlerErrorCode {
    /// Stable string form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidRequest => "InvalidRequest",
            Self::ResourceConflict => "ResourceConflict",
            Self::ServiceLimitExceeded => "ServiceLimitExceeded",
            Self::AccessDenied => "AccessDenied",
            Self::UnauthorizedTaggingOperation => "UnauthorizedTaggingOperation",
            Self::Throttling => "Throttling",
            Self::NotStabilized => "NotStabilized",
            Self::InternalFailure => "InternalFailure",
        }
    }
}

impl std::fmt::Display for HandlerErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete failure type of a remote call, independent of any service code
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The service answered with a typed error (see `RemoteError::code`)
    Service,
    /// The client gave up waiting for a response
    Timeout,
    /// Connection could not be established or was reset
    Connection,
    /// The client throttled itself before sending
    Throttled,
    /// The client rejected the request before sending
    Validation,
    /// Any other client-side fault
    Internal,
}

/// Failure returned by a remote API call
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Concrete failure type
    pub kind: ErrorKind,
    /// Structured service error code, if the service returned one
    pub code: Option<Box<str>>,
    /// Human readable message
    pub message: Box<str>,
}

impl RemoteError {
    /// Error returned by the service with a structured code
    pub fn service(code: &str, message: &str) -> Self {
        Self {
            kind: ErrorKind::Service,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error of a concrete kind without a service code
    pub fn of_kind(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Service code, if any
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Invalid handler configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("backoff timeout ({timeout_seconds}s) is shorter than delay ({delay_seconds}s)")]
    TimeoutShorterThanDelay {
        delay_seconds: u64,
        timeout_seconds: u64,
    },
    #[error("backoff {field} must be whole seconds, got {millis}ms")]
    SubSecondDuration { field: &'static str, millis: u128 },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: Box<str>, value: Box<str> },
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Binary operation state could not be encoded or decoded
#[derive(Debug, thiserror::Error)]
pub enum StateCodecError {
    #[error("encode failed: {0}")]
    Encode(Box<str>),
    #[error("decode failed: {0}")]
    Decode(Box<str>),
}
