use thiserror::Error;

/// Classified transport failures.
///
/// Any of these aborts the sync call that hit it; retrying is the caller's
/// decision, never the engine's.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("internal server error")]
    InternalServerError,

    #[error("service unreachable: {0}")]
    UnreachableService(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
