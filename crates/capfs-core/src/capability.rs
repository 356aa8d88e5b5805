//! The capability contracts a backing filesystem can implement.
//!
//! [`Basic`] is mandatory. [`Dir`], [`Symlink`] and [`Change`] are optional
//! extensions, reached through the probing methods on [`Basic`]. All paths
//! are normalized, slash-separated and relative to the filesystem root (see
//! [`crate::path`]).
//!
//! Every trait is object safe and requires `Send + Sync`: a mount shares one
//! backend across concurrently running requests.

use crate::error::{FsError, FsResult};
use crate::metadata::{DirEntry, Metadata, OpenFlags};
use std::fmt;
use std::io::SeekFrom;
use std::str::FromStr;
use std::time::SystemTime;

/// The required filesystem contract.
pub trait Basic: Send + Sync {
    /// Returns metadata for `path` without following a final symlink.
    fn stat(&self, path: &str) -> FsResult<Metadata>;

    /// Opens `path` with the given `O_*` flags, creating it with `mode`
    /// permission bits when `flags` asks for creation.
    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>>;

    /// Removes a file, symlink or directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Moves `from` to `to`, replacing `to` if the backend allows it.
    fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    /// Directory capability, if supported.
    fn as_dir(&self) -> Option<&dyn Dir> {
        None
    }

    /// Symlink capability, if supported.
    fn as_symlink(&self) -> Option<&dyn Symlink> {
        None
    }

    /// Metadata-change capability, if supported.
    fn as_change(&self) -> Option<&dyn Change> {
        None
    }
}

/// Directory creation and listing.
pub trait Dir: Send + Sync {
    /// Creates `path` and every missing parent with `mode` permission bits.
    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Lists the entries of the directory at `path`.
    fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>>;
}

/// Symbolic links.
pub trait Symlink: Send + Sync {
    /// Creates a link at `link` pointing to `target` (stored verbatim).
    fn symlink(&self, target: &str, link: &str) -> FsResult<()>;

    /// Returns the target of the link at `path`.
    fn readlink(&self, path: &str) -> FsResult<String>;
}

/// Mode, ownership and timestamp changes.
pub trait Change: Send + Sync {
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Changes ownership without following a final symlink. `None` leaves
    /// that side unchanged.
    fn lchown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()>;

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> FsResult<()>;
}

/// An open file.
///
/// Methods take `&self`; implementations keep their cursor and closed state
/// behind interior mutability so one file object can serve concurrent
/// positioned reads.
pub trait File: Send + Sync + fmt::Debug {
    /// The path the file was opened with.
    fn name(&self) -> &str;

    /// Reads into `buf` starting at `offset`.
    ///
    /// May return fewer bytes than requested. Returns `Ok(0)` at or past the
    /// end of the file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Writes at the current cursor and advances it.
    fn write(&self, data: &[u8]) -> FsResult<usize>;

    /// Moves the cursor.
    fn seek(&self, pos: SeekFrom) -> FsResult<u64>;

    /// Sets the file length.
    fn truncate(&self, size: u64) -> FsResult<()>;

    /// Closes the file. Later calls on the object fail with [`FsError::Closed`].
    fn close(&self) -> FsResult<()>;

    /// Positioned write support, if the file offers it.
    fn as_write_at(&self) -> Option<&dyn WriteAt> {
        None
    }
}

/// Positioned writes that do not touch the file cursor.
pub trait WriteAt: Send + Sync {
    fn write_at(&self, data: &[u8], offset: u64) -> FsResult<usize>;
}

/// The optional capabilities a backend can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Dir,
    Symlink,
    Change,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Dir, Capability::Symlink, Capability::Change];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Dir => "dir",
            Capability::Symlink => "symlink",
            Capability::Change => "change",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dir" | "directory" => Ok(Capability::Dir),
            "symlink" | "link" => Ok(Capability::Symlink),
            "change" | "metadata" => Ok(Capability::Change),
            other => Err(FsError::InvalidArgument(format!("unknown capability: {other}"))),
        }
    }
}

/// A set of optional capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub dir: bool,
    pub symlink: bool,
    pub change: bool,
}

impl Capabilities {
    /// No optional capability.
    pub const NONE: Self = Self {
        dir: false,
        symlink: false,
        change: false,
    };

    /// Every optional capability.
    pub const ALL: Self = Self {
        dir: true,
        symlink: true,
        change: true,
    };

    /// Probes a backend.
    pub fn of(fs: &dyn Basic) -> Self {
        Self {
            dir: fs.as_dir().is_some(),
            symlink: fs.as_symlink().is_some(),
            change: fs.as_change().is_some(),
        }
    }

    pub fn contains(self, cap: Capability) -> bool {
        match cap {
            Capability::Dir => self.dir,
            Capability::Symlink => self.symlink,
            Capability::Change => self.change,
        }
    }

    #[must_use]
    pub fn with(mut self, cap: Capability) -> Self {
        self.set(cap, true);
        self
    }

    #[must_use]
    pub fn without(mut self, cap: Capability) -> Self {
        self.set(cap, false);
        self
    }

    fn set(&mut self, cap: Capability, enabled: bool) {
        match cap {
            Capability::Dir => self.dir = enabled,
            Capability::Symlink => self.symlink = enabled,
            Capability::Change => self.change = enabled,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Capability::ALL
            .iter()
            .filter(|c| self.contains(**c))
            .map(|c| c.as_str())
            .collect();
        if names.is_empty() {
            f.write_str("basic")
        } else {
            write!(f, "basic+{}", names.join("+"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parse() {
        assert_eq!("dir".parse::<Capability>().unwrap(), Capability::Dir);
        assert_eq!(" Symlink ".parse::<Capability>().unwrap(), Capability::Symlink);
        assert_eq!("metadata".parse::<Capability>().unwrap(), Capability::Change);
        assert!("xattr".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capabilities_set_ops() {
        let caps = Capabilities::ALL.without(Capability::Symlink);
        assert!(caps.contains(Capability::Dir));
        assert!(!caps.contains(Capability::Symlink));
        assert!(caps.contains(Capability::Change));

        let caps = Capabilities::NONE.with(Capability::Change);
        assert_eq!(caps, Capabilities { dir: false, symlink: false, change: true });
    }

    #[test]
    fn test_capabilities_display() {
        assert_eq!(Capabilities::NONE.to_string(), "basic");
        assert_eq!(Capabilities::ALL.to_string(), "basic+dir+symlink+change");
    }
}
