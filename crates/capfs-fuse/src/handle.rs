//! Open files and open directories.

use crate::error::{Errno, FuseResult, translate};
use crate::hook::Call;
use crate::root::Root;
use capfs_core::{File, FileKind, FsError};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// How writes reach the backing file. Decided once, when the handle is made.
enum WriteStrategy {
    /// The file supports positioned writes; no locking needed.
    Positioned,
    /// Seek then write, under a per-handle lock so concurrent writes on the
    /// same handle cannot interleave.
    Serialized(Mutex<()>),
}

/// An open file.
pub struct Handle {
    root: Root,
    file: Box<dyn File>,
    writes: WriteStrategy,
    released: AtomicBool,
}

impl Handle {
    pub(crate) fn new(root: Root, file: Box<dyn File>) -> Self {
        let writes = if file.as_write_at().is_some() {
            WriteStrategy::Positioned
        } else {
            debug!(file = file.name(), "no positioned writes, serializing seek+write");
            WriteStrategy::Serialized(Mutex::new(()))
        };
        Self {
            root,
            file,
            writes,
            released: AtomicBool::new(false),
        }
    }

    /// The path the file was opened with.
    pub fn name(&self) -> &str {
        self.file.name()
    }

    /// Returns true if writes go through the locked seek+write path.
    pub fn is_serialized(&self) -> bool {
        matches!(self.writes, WriteStrategy::Serialized(_))
    }

    /// Reads up to `size` bytes at `offset`.
    ///
    /// Reaching the end of the file is not an error: the result is simply
    /// shorter than `size`.
    pub fn read(&self, offset: u64, size: usize) -> FuseResult<Vec<u8>> {
        self.root.check(&Call::Read {
            path: self.name(),
            offset,
            size,
        })?;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(FsError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(FsError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Errno::from(&e)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Writes `data` at `offset`, returning the number of bytes written.
    pub fn write(&self, offset: u64, data: &[u8]) -> FuseResult<usize> {
        self.root.check(&Call::Write {
            path: self.name(),
            offset,
            len: data.len(),
        })?;
        match &self.writes {
            WriteStrategy::Positioned => {
                let writer = self.file.as_write_at().ok_or(Errno::EIO)?;
                let mut written = 0;
                while written < data.len() {
                    let n = translate(writer.write_at(&data[written..], offset + written as u64))?;
                    if n == 0 {
                        break;
                    }
                    written += n;
                }
                Ok(written)
            }
            WriteStrategy::Serialized(lock) => {
                let _guard = lock.lock();
                translate(self.file.seek(SeekFrom::Start(offset)))?;
                let mut written = 0;
                while written < data.len() {
                    let n = translate(self.file.write(&data[written..]))?;
                    if n == 0 {
                        break;
                    }
                    written += n;
                }
                Ok(written)
            }
        }
    }

    /// Closes the backing file. Only the first call closes; later calls
    /// report `EINVAL`.
    pub fn release(&self) -> FuseResult<()> {
        self.root.check(&Call::Release { path: self.name() })?;
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(Errno::EINVAL);
        }
        translate(self.file.close())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("file", &self.file)
            .field("serialized", &self.is_serialized())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

/// One classified directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub kind: FileKind,
}

/// An open directory. Holds no cursor; every listing reads the backing
/// directory afresh.
#[derive(Clone)]
pub struct DirHandle {
    root: Root,
    path: String,
}

impl DirHandle {
    pub(crate) fn new(root: Root, path: String) -> Self {
        Self { root, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Lists every entry, in the order the backing filesystem returns them.
    pub fn read_dir_all(&self) -> FuseResult<Vec<Dirent>> {
        self.root.check(&Call::ReadDir { path: &self.path })?;
        let Some(dirs) = self.root.fs().as_dir() else {
            debug!(path = %self.path, "readdir: backing filesystem has no directory support");
            return Err(Errno::ENOSYS);
        };
        let entries = translate(dirs.read_dir(&self.path))?;
        Ok(entries
            .into_iter()
            .map(|e| Dirent {
                kind: e.metadata.kind(),
                name: e.name,
            })
            .collect())
    }
}

impl fmt::Debug for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirHandle").field(&self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Opened;
    use capfs_core::{MemFs, OpenFlags};
    use std::sync::Arc;

    fn open_rw(root: &Root, name: &str) -> Handle {
        let (_, handle) = root
            .node()
            .create(name, OpenFlags::READ_WRITE, 0o644)
            .unwrap();
        handle
    }

    #[test]
    fn test_strategy_follows_backend() {
        let root = Root::new(Arc::new(MemFs::new()));
        assert!(!open_rw(&root, "a").is_serialized());

        let root = Root::new(Arc::new(MemFs::new().without_positioned_writes()));
        assert!(open_rw(&root, "a").is_serialized());
    }

    #[test]
    fn test_read_short_at_eof() {
        let root = Root::new(Arc::new(MemFs::new()));
        let handle = open_rw(&root, "f");
        handle.write(0, b"0123456789").unwrap();

        assert_eq!(handle.read(6, 100).unwrap(), b"6789");
        assert!(handle.read(10, 100).unwrap().is_empty());
        assert!(handle.read(500, 4).unwrap().is_empty());
        assert!(handle.read(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_serialized_write_at_offset() {
        let root = Root::new(Arc::new(MemFs::new().without_positioned_writes()));
        let handle = open_rw(&root, "f");
        assert_eq!(handle.write(4, b"tail").unwrap(), 4);
        assert_eq!(handle.write(0, b"head").unwrap(), 4);
        assert_eq!(handle.read(0, 8).unwrap(), b"headtail");
    }

    #[test]
    fn test_double_release() {
        let root = Root::new(Arc::new(MemFs::new()));
        let handle = open_rw(&root, "f");
        handle.release().unwrap();
        assert!(handle.is_released());
        assert_eq!(handle.release().unwrap_err(), Errno::EINVAL);
        // The backing file is closed
        assert_eq!(handle.write(0, b"x").unwrap_err(), Errno::EINVAL);
    }

    #[test]
    fn test_read_dir_all_classifies() {
        let fs = Arc::new(MemFs::new());
        let root = Root::new(fs.clone());
        root.node().mkdir("dir", 0o755).unwrap();
        open_rw(&root, "file").release().unwrap();
        root.node().symlink("file", "link").unwrap();

        let Opened::Dir(dir) = root.node().open(OpenFlags::READ, true).unwrap() else {
            panic!("expected a directory handle");
        };
        let entries = dir.read_dir_all().unwrap();
        assert_eq!(
            entries,
            vec![
                Dirent { name: "dir".into(), kind: FileKind::Directory },
                Dirent { name: "file".into(), kind: FileKind::File },
                Dirent { name: "link".into(), kind: FileKind::Symlink },
            ]
        );
    }

    #[test]
    fn test_read_dir_of_file() {
        let root = Root::new(Arc::new(MemFs::new()));
        open_rw(&root, "file").release().unwrap();
        let dir = DirHandle::new(root, "file".into());
        assert_eq!(dir.read_dir_all().unwrap_err(), Errno(libc::ENOTDIR));
    }
}
