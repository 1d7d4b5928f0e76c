//! error types for the resolution engine.
//!
//! resolution errors never surface as user-facing failures on read
//! queries: callers degrade to "no access" or the last known-good
//! snapshot. the taxonomy here exists for logging and for the rebuild
//! pipeline's retry/alert logic.

use gatewarden_types::UserId;
use thiserror::Error;

/// error raised by a [`Directory`](crate::Directory) implementation.
///
/// the in-memory store is infallible, but the trait allows for backends
/// that can fail (network, database), so every engine path that reads
/// the directory propagates this.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DirectoryError(pub String);

impl DirectoryError {
    /// create a directory error from any displayable cause.
    pub fn new(cause: impl std::fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// errors that can occur in the resolution engine.
#[derive(Debug, Error)]
pub enum Error {
    /// the underlying directory failed to answer.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// a background rebuild failed; the previous snapshot (if any)
    /// remains authoritative.
    #[error("rebuild failed for user {user}: {source}")]
    RebuildFailed {
        /// the user whose view was being rebuilt.
        user: UserId,
        /// the underlying cause.
        #[source]
        source: DirectoryError,
    },
}

/// result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
