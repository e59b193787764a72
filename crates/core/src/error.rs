//! Unified error types for liteproxy.
//!
//! Every variant carries a stable code prefix and maps onto the status
//! reason the upstream control plane would report for the same condition.

use tokio_rusqlite::rusqlite;

/// Unified error types for the liteproxy crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request could not be resolved to something servable.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Content type is unknown and no default could be substituted.
    #[error("UNSUPPORTED_MEDIA_TYPE: {0}")]
    UnsupportedMediaType(String),

    /// No cached object for the requested key.
    #[error("NOT_FOUND: {resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },

    /// Operation is refused while serving from the cache.
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),

    /// Payload could not be decoded.
    #[error("DECODE_FAILED: {0}")]
    Decode(String),

    /// Object could not be encoded into the negotiated content type.
    #[error("ENCODE_FAILED: {0}")]
    Encode(String),

    /// Upstream control plane could not be reached.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Filesystem store operation failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound { resource: resource.into(), name: name.into() }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidRequest(_) => 400,
            Error::Forbidden(_) => 403,
            Error::NotFound { .. } => 404,
            Error::UnsupportedMediaType(_) => 415,
            Error::Upstream(_) => 503,
            Error::Decode(_)
            | Error::Encode(_)
            | Error::Database(_)
            | Error::MigrationFailed(_)
            | Error::Io(_) => 500,
        }
    }

    /// Status reason as reported by the control plane.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "BadRequest",
            Error::Forbidden(_) => "Forbidden",
            Error::NotFound { .. } => "NotFound",
            Error::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Error::Upstream(_) => "ServiceUnavailable",
            _ => "InternalError",
        }
    }

    /// Message without the code prefix, as shown inside a status envelope.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidRequest(msg)
            | Error::UnsupportedMediaType(msg)
            | Error::Forbidden(msg)
            | Error::Decode(msg)
            | Error::Encode(msg)
            | Error::Upstream(msg)
            | Error::MigrationFailed(msg) => msg.clone(),
            Error::NotFound { resource, name } => format!("{resource} \"{name}\" not found"),
            Error::Database(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
