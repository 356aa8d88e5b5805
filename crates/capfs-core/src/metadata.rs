//! File metadata, directory entries and open flags.

use std::fmt;
use std::time::SystemTime;

/// Bit mask for the file type portion of a mode.
pub const S_IFMT: u32 = 0o170_000;
/// Directory file type.
pub const S_IFDIR: u32 = 0o040_000;
/// Regular file type.
pub const S_IFREG: u32 = 0o100_000;
/// Symbolic link file type.
pub const S_IFLNK: u32 = 0o120_000;
/// Permission bits (including setuid, setgid and sticky).
pub const PERM_MASK: u32 = 0o7777;

/// The type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Regular file (also used for anything that is neither a directory nor a link).
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileKind {
    /// Classifies a full mode value.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => FileKind::Directory,
            S_IFLNK => FileKind::Symlink,
            _ => FileKind::File,
        }
    }

    /// The file type bits for this kind.
    pub fn type_bits(self) -> u32 {
        match self {
            FileKind::File => S_IFREG,
            FileKind::Directory => S_IFDIR,
            FileKind::Symlink => S_IFLNK,
        }
    }
}

/// Metadata reported by a backing filesystem.
///
/// `mode` carries both the file type bits and the permission bits, in the
/// usual `st_mode` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// File type and permission bits.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Last access time, if the backend tracks it.
    pub accessed: Option<SystemTime>,
    /// Owner user id, if the backend tracks it.
    pub uid: Option<u32>,
    /// Owner group id, if the backend tracks it.
    pub gid: Option<u32>,
}

impl Metadata {
    /// Creates metadata for the given kind and permission bits.
    pub fn new(kind: FileKind, perm: u32, size: u64, modified: SystemTime) -> Self {
        Self {
            mode: kind.type_bits() | (perm & PERM_MASK),
            size,
            modified,
            accessed: None,
            uid: None,
            gid: None,
        }
    }

    /// The entry type.
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// The permission bits without the type.
    pub fn permissions(&self) -> u32 {
        self.mode & PERM_MASK
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind() == FileKind::Symlink
    }

    pub fn is_file(&self) -> bool {
        self.kind() == FileKind::File
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry within its directory.
    pub name: String,
    /// Metadata of the entry (symlinks are not followed).
    pub metadata: Metadata,
}

/// Flags passed to [`Basic::open_file`](crate::Basic::open_file).
///
/// The bit values are the host's `O_*` constants, so flags received from
/// the kernel can be passed through unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags(i32);

impl OpenFlags {
    /// Open for reading only.
    pub const READ: Self = Self(libc::O_RDONLY);
    /// Open for writing only.
    pub const WRITE: Self = Self(libc::O_WRONLY);
    /// Open for reading and writing.
    pub const READ_WRITE: Self = Self(libc::O_RDWR);
    /// Create a file for writing, truncating any existing content.
    pub const CREATE_WRITE: Self = Self(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC);

    /// Wraps raw `O_*` bits.
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// The raw `O_*` bits.
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Returns these flags with `other` added.
    #[must_use]
    pub const fn with(self, other: i32) -> Self {
        Self(self.0 | other)
    }

    fn access_mode(self) -> i32 {
        self.0 & libc::O_ACCMODE
    }

    pub fn readable(self) -> bool {
        matches!(self.access_mode(), libc::O_RDONLY | libc::O_RDWR)
    }

    pub fn writable(self) -> bool {
        matches!(self.access_mode(), libc::O_WRONLY | libc::O_RDWR)
    }

    pub fn create(self) -> bool {
        self.0 & libc::O_CREAT != 0
    }

    pub fn exclusive(self) -> bool {
        self.0 & libc::O_EXCL != 0
    }

    pub fn truncate(self) -> bool {
        self.0 & libc::O_TRUNC != 0
    }

    pub fn append(self) -> bool {
        self.0 & libc::O_APPEND != 0
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFlags")
            .field("read", &self.readable())
            .field("write", &self.writable())
            .field("create", &self.create())
            .field("exclusive", &self.exclusive())
            .field("truncate", &self.truncate())
            .field("append", &self.append())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mode() {
        assert_eq!(FileKind::from_mode(S_IFDIR | 0o755), FileKind::Directory);
        assert_eq!(FileKind::from_mode(S_IFLNK | 0o777), FileKind::Symlink);
        assert_eq!(FileKind::from_mode(S_IFREG | 0o644), FileKind::File);
        // Sockets, fifos and devices are reported as plain files
        assert_eq!(FileKind::from_mode(0o010_000 | 0o644), FileKind::File);
    }

    #[test]
    fn test_metadata_new() {
        let meta = Metadata::new(FileKind::Directory, 0o40_755, 0, SystemTime::UNIX_EPOCH);
        assert!(meta.is_dir());
        assert_eq!(meta.permissions(), 0o755);
        assert_eq!(meta.mode, S_IFDIR | 0o755);
    }

    #[test]
    fn test_open_flags() {
        assert!(OpenFlags::READ.readable());
        assert!(!OpenFlags::READ.writable());
        assert!(OpenFlags::READ_WRITE.readable());
        assert!(OpenFlags::READ_WRITE.writable());

        let flags = OpenFlags::CREATE_WRITE;
        assert!(flags.create());
        assert!(flags.truncate());
        assert!(flags.writable());
        assert!(!flags.readable());
        assert!(!flags.exclusive());

        let flags = OpenFlags::WRITE.with(libc::O_APPEND | libc::O_EXCL);
        assert!(flags.append());
        assert!(flags.exclusive());
    }
}
