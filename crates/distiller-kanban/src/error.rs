//! Error types for distiller-kanban.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by bucket, pipe and pipeline operations.
///
/// Stage failures are not represented here: a [`crate::Filter`] contains them
/// by quarantining the token. These variants are infrastructure and
/// configuration faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A specific token was requested but is not waiting in the bucket.
    #[error("token not found: {id} in {}", bucket.display())]
    TokenNotFound { id: String, bucket: PathBuf },

    /// The pipe already holds a token and may not take a second one.
    #[error("pipe already holding token: {id}")]
    AlreadyHolding { id: String },

    /// A commit/quarantine/release was requested with nothing held.
    #[error("pipe is not holding a token")]
    NotHolding,

    /// A bucket name was not registered with the pipeline.
    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    /// The identifier cannot be used as a token file stem.
    #[error("invalid token id: {0:?}")]
    InvalidTokenId(String),

    /// `id` and `log` are owned by the token itself.
    #[error("reserved token property: {0}")]
    ReservedProperty(String),

    /// A token file could not be decoded.
    #[error("corrupt token file {}: {message}", path.display())]
    CorruptToken { path: PathBuf, message: String },

    /// A token was interrupted while being committed from one bucket to the next.
    #[error("token {id} was interrupted mid-commit from {} to {}; it may already be downstream", input.display(), output.display())]
    CommitConflict {
        id: String,
        input: PathBuf,
        output: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a token not found error.
    pub fn token_not_found(id: impl Into<String>, bucket: impl Into<PathBuf>) -> Self {
        Self::TokenNotFound {
            id: id.into(),
            bucket: bucket.into(),
        }
    }

    /// Create an already holding error.
    pub fn already_holding(id: impl Into<String>) -> Self {
        Self::AlreadyHolding { id: id.into() }
    }

    /// Create a corrupt token error.
    pub fn corrupt_token(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptToken {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when the error means "the thing you asked for is not there".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::TokenNotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io(err.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::token_not_found("2026-01-29", "/buckets/intake");
        assert_eq!(
            err.to_string(),
            "token not found: 2026-01-29 in /buckets/intake"
        );

        let err = Error::already_holding("abc");
        assert_eq!(err.to_string(), "pipe already holding token: abc");

        let err = Error::NoSuchBucket("nowhere".into());
        assert_eq!(err.to_string(), "no such bucket: nowhere");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::token_not_found("x", "/b").is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::from(io).is_not_found());
        assert!(!Error::NotHolding.is_not_found());
    }
}
