//! Attribute translation.
//!
//! Only mode, size and modification time are taken from backing metadata;
//! everything else handed to the kernel comes from the mount configuration.

use capfs_core::{FileKind, Metadata};
use fuser::{FileAttr, FileType};
use std::time::SystemTime;

/// Block size reported to the kernel.
pub const BLOCK_SIZE: u32 = 4096;

/// The attribute record produced from backing metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    /// File type and permission bits.
    pub mode: u32,
    pub size: u64,
    pub mtime: SystemTime,
}

impl From<&Metadata> for Attr {
    fn from(meta: &Metadata) -> Self {
        Self {
            mode: meta.mode,
            size: meta.size,
            mtime: meta.modified,
        }
    }
}

impl Attr {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Permission bits as the kernel expects them.
    pub fn perm(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }

    /// Builds the full kernel attribute record.
    pub fn to_file_attr(&self, ino: u64, uid: u32, gid: u32) -> FileAttr {
        FileAttr {
            ino,
            size: self.size,
            blocks: self.size.div_ceil(512),
            atime: self.mtime,
            mtime: self.mtime,
            ctime: self.mtime,
            crtime: self.mtime,
            kind: file_type(self.kind()),
            perm: self.perm(),
            nlink: 1,
            uid,
            gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

/// Maps a backing entry kind to the kernel file type.
pub fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::Symlink => FileType::Symlink,
        FileKind::File => FileType::RegularFile,
    }
}
