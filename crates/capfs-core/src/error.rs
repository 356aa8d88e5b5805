//! Error type shared by every backing filesystem.
//!
//! Backends report failures through [`FsError`]. The variants mirror the
//! conditions a mount layer needs to tell apart (missing entry, existing
//! entry, permission, invalid input, missing capability); anything else is
//! carried as an [`io::Error`] or, when a backend wants exact control over
//! the errno seen by the kernel, as a raw [`FsError::Errno`].

use std::io;
use thiserror::Error;

/// Errors produced by backing filesystems.
#[derive(Debug, Error)]
pub enum FsError {
    /// The entry already exists.
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    /// The entry does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An argument (usually a path or name) was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The file object was already closed.
    #[error("file already closed")]
    Closed,

    /// The path would leave the filesystem root.
    #[error("path crosses the filesystem boundary: {0}")]
    CrossedBoundary(String),

    /// The backend does not support this operation.
    #[error("operation not supported")]
    NotSupported,

    /// A raw errno value, handed to the kernel unchanged.
    #[error("errno {0}")]
    Errno(i32),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// Returns true if this error means "the entry already exists".
    pub fn is_already_exists(&self) -> bool {
        match self {
            FsError::AlreadyExists(_) => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::AlreadyExists,
            _ => false,
        }
    }

    /// Returns true if this error means "the entry does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true if this error is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            FsError::PermissionDenied(_) => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Returns true for invalid arguments, closed files and boundary escapes.
    pub fn is_invalid(&self) -> bool {
        match self {
            FsError::InvalidArgument(_) | FsError::Closed | FsError::CrossedBoundary(_) => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::InvalidInput,
            _ => false,
        }
    }

    /// Returns true if the backend lacks support for the operation.
    pub fn is_not_supported(&self) -> bool {
        match self {
            FsError::NotSupported => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::Unsupported,
            _ => false,
        }
    }

    /// Shorthand for [`FsError::NotFound`].
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound(path.into())
    }

    /// Shorthand for [`FsError::AlreadyExists`].
    pub fn exists(path: impl Into<String>) -> Self {
        FsError::AlreadyExists(path.into())
    }
}

/// Result type for backing filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
