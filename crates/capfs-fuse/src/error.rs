//! Error handling and mapping for the FUSE adapter.
//!
//! Backing filesystems report [`FsError`]; the kernel only understands
//! errno values. [`Errno`] is the value every translation operation
//! returns, built from an [`FsError`] by a fixed, ordered set of rules:
//!
//! 1. a raw [`FsError::Errno`] passes through unchanged
//! 2. "already exists" becomes `EEXIST`
//! 3. "not found" becomes `ENOENT`
//! 4. permission failures become `EPERM`
//! 5. invalid arguments, closed files and boundary escapes become `EINVAL`
//! 6. missing support becomes `ENOTSUP`
//! 7. anything else becomes `EIO`

use capfs_core::FsError;
use std::io;
use thiserror::Error;

/// A POSIX error number as handed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("errno {0}")]
pub struct Errno(pub i32);

impl Errno {
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOTSUP: Errno = Errno(libc::ENOTSUP);
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EBADF: Errno = Errno(libc::EBADF);

    /// The raw code, for `reply.error(..)`.
    pub fn code(self) -> i32 {
        self.0
    }
}

impl From<&FsError> for Errno {
    fn from(err: &FsError) -> Self {
        if let FsError::Errno(code) = err {
            return Errno(*code);
        }
        if err.is_already_exists() {
            Errno::EEXIST
        } else if err.is_not_found() {
            Errno::ENOENT
        } else if err.is_permission_denied() {
            Errno::EPERM
        } else if err.is_invalid() {
            Errno::EINVAL
        } else if err.is_not_supported() {
            Errno::ENOTSUP
        } else {
            Errno::EIO
        }
    }
}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        Errno::from(&err)
    }
}

/// Translates a backing result, leaving success untouched.
pub fn translate<T>(result: Result<T, FsError>) -> Result<T, Errno> {
    result.map_err(|e| Errno::from(&e))
}

/// Result type for translated operations.
pub type FuseResult<T> = Result<T, Errno>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for FsError {
    fn to_errno(&self) -> i32 {
        Errno::from(self).code()
    }
}

impl ToErrno for Errno {
    fn to_errno(&self) -> i32 {
        self.0
    }
}

impl ToErrno for io::Error {
    fn to_errno(&self) -> i32 {
        self.raw_os_error().unwrap_or(libc::EIO)
    }
}

/// Errors that can occur while mounting.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mountpoint does not exist or is not a directory.
    #[error("Mountpoint does not exist or is not a directory: {0}")]
    InvalidMountpoint(String),

    /// The FUSE session failed to start.
    #[error("Failed to mount filesystem: {0}")]
    Mount(#[source] io::Error),

    /// Filesystem construction failed.
    #[error("Filesystem initialization failed: {0}")]
    Init(String),
}
