//! Filesystem error taxonomy.

use std::io;
use thiserror::Error;

/// Errors produced by tree construction and session operations.
///
/// `Conflict` and `InvalidPath` only occur at construction time and abort
/// the mount; everything else is local to a single call and never corrupts
/// shared state.
#[derive(Debug, Error)]
pub enum FsError {
    /// Node or child name does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path segment resolved to both a file and a directory. Usually a
    /// domain-normalization collision; fatal at construction time.
    #[error("conflicting entry: {0}")]
    Conflict(String),

    /// Write intent on a read-only mount.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation is structurally unavailable on this filesystem.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// Open was attempted on a directory node.
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// Handle is not in the open table.
    #[error("bad handle: {0}")]
    BadHandle(u64),

    /// Manifest path produced no usable segments.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// Backing file missing or unreadable; local to the call.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create an IsDirectory error.
    pub fn is_directory(what: impl Into<String>) -> Self {
        Self::IsDirectory(what.into())
    }
}

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
