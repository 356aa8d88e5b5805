//! In-memory filesystem implementing every capability.
//!
//! Entries live in a single ordered map keyed by normalized path, so
//! directory listings come back sorted by name. Open files share the entry
//! they were opened on: a rename or remove does not invalidate them.
//!
//! By default files support positioned writes. [`MemFs::without_positioned_writes`]
//! builds a filesystem whose files only offer cursor-based writes, which is
//! useful to exercise callers' seek+write fallback.

use crate::capability::{Basic, Change, Dir, File, Symlink, WriteAt};
use crate::error::{FsError, FsResult};
use crate::metadata::{DirEntry, FileKind, Metadata, OpenFlags, PERM_MASK};
use crate::path;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::trace;

/// Maximum number of symlinks followed while resolving a path.
const MAX_SYMLINK_HOPS: usize = 16;

/// Default permission bits of the root directory.
const ROOT_PERM: u32 = 0o755;

/// Largest file a [`MemFs`] holds. Growing a file past it fails with `EFBIG`.
pub const MAX_FILE_SIZE: u64 = 1 << 32;

#[derive(Debug, Clone, Copy)]
struct Attrs {
    perm: u32,
    modified: SystemTime,
    accessed: SystemTime,
    uid: u32,
    gid: u32,
}

impl Attrs {
    fn new(perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            perm: perm & PERM_MASK,
            modified: now,
            accessed: now,
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Debug)]
struct MemNode {
    kind: FileKind,
    /// Link target; empty for files and directories.
    target: String,
    /// File content; always empty for directories and links.
    data: RwLock<Vec<u8>>,
    attrs: Mutex<Attrs>,
}

impl MemNode {
    fn new(kind: FileKind, perm: u32) -> Arc<Self> {
        Arc::new(Self {
            kind,
            target: String::new(),
            data: RwLock::new(Vec::new()),
            attrs: Mutex::new(Attrs::new(perm)),
        })
    }

    fn link(target: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: FileKind::Symlink,
            target: target.to_string(),
            data: RwLock::new(Vec::new()),
            attrs: Mutex::new(Attrs::new(0o777)),
        })
    }

    fn metadata(&self) -> Metadata {
        let attrs = *self.attrs.lock();
        let size = match self.kind {
            FileKind::File => self.data.read().len() as u64,
            FileKind::Symlink => self.target.len() as u64,
            FileKind::Directory => 0,
        };
        Metadata {
            mode: self.kind.type_bits() | attrs.perm,
            size,
            modified: attrs.modified,
            accessed: Some(attrs.accessed),
            uid: Some(attrs.uid),
            gid: Some(attrs.gid),
        }
    }

    fn touch(&self) {
        self.attrs.lock().modified = SystemTime::now();
    }
}

type Tree = BTreeMap<String, Arc<MemNode>>;

/// In-memory filesystem.
pub struct MemFs {
    tree: RwLock<Tree>,
    positioned_writes: bool,
}

impl MemFs {
    /// Creates an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert(String::new(), MemNode::new(FileKind::Directory, ROOT_PERM));
        Self {
            tree: RwLock::new(tree),
            positioned_writes: true,
        }
    }

    /// Files opened from the returned filesystem do not offer positioned writes.
    #[must_use]
    pub fn without_positioned_writes(mut self) -> Self {
        self.positioned_writes = false;
        self
    }

    /// Returns true if opened files support positioned writes.
    pub fn positioned_writes(&self) -> bool {
        self.positioned_writes
    }

    /// Number of entries, including the root directory.
    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    /// Returns true if only the root directory exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    fn lookup(tree: &Tree, key: &str) -> FsResult<Arc<MemNode>> {
        tree.get(key).cloned().ok_or_else(|| FsError::not_found(key))
    }

    fn check_parent(tree: &Tree, key: &str) -> FsResult<()> {
        let parent = Self::lookup(tree, path::parent(key))?;
        if parent.kind == FileKind::Directory {
            Ok(())
        } else {
            Err(FsError::Errno(libc::ENOTDIR))
        }
    }

    fn has_children(tree: &Tree, key: &str) -> bool {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        tree.range(prefix.clone()..)
            .find(|(k, _)| k.as_str() != key)
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    /// Follows symlinks until a non-link entry (or a missing one) is reached.
    ///
    /// Returns the resolved key and the entry, if it exists.
    fn resolve(tree: &Tree, key: &str) -> FsResult<(String, Option<Arc<MemNode>>)> {
        let mut current = key.to_string();
        for _ in 0..MAX_SYMLINK_HOPS {
            match tree.get(&current) {
                Some(node) if node.kind == FileKind::Symlink => {
                    let target = if node.target.starts_with('/') {
                        node.target.clone()
                    } else {
                        format!("{}/{}", path::parent(&current), node.target)
                    };
                    current = path::normalize(&target)?;
                }
                Some(node) => return Ok((current, Some(Arc::clone(node)))),
                None => return Ok((current, None)),
            }
        }
        Err(FsError::Errno(libc::ELOOP))
    }

    fn resolve_existing(tree: &Tree, key: &str) -> FsResult<Arc<MemNode>> {
        match Self::resolve(tree, key)? {
            (_, Some(node)) => Ok(node),
            (resolved, None) => Err(FsError::not_found(resolved)),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFs")
            .field("entries", &self.len())
            .field("positioned_writes", &self.positioned_writes)
            .finish()
    }
}

impl Basic for MemFs {
    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        Ok(Self::lookup(&tree, &key)?.metadata())
    }

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>> {
        let key = path::normalize(path)?;
        let mut tree = self.tree.write();

        if flags.create() && flags.exclusive() && tree.contains_key(&key) {
            return Err(FsError::exists(key));
        }

        let (resolved, existing) = Self::resolve(&tree, &key)?;
        let node = match existing {
            Some(node) => {
                if node.kind == FileKind::Directory {
                    return Err(FsError::Errno(libc::EISDIR));
                }
                if flags.truncate() && flags.writable() {
                    node.data.write().clear();
                    node.touch();
                }
                node
            }
            None => {
                if !flags.create() {
                    return Err(FsError::not_found(resolved));
                }
                Self::check_parent(&tree, &resolved)?;
                let node = MemNode::new(FileKind::File, mode);
                tree.insert(resolved.clone(), Arc::clone(&node));
                trace!(path = %resolved, mode = format_args!("{mode:o}"), "memfs: created file");
                node
            }
        };

        Ok(Box::new(MemFile {
            name: key,
            node,
            flags,
            cursor: Mutex::new(0),
            closed: AtomicBool::new(false),
            positioned: self.positioned_writes,
        }))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let key = path::normalize(path)?;
        if key.is_empty() {
            return Err(FsError::InvalidArgument("cannot remove the root".into()));
        }
        let mut tree = self.tree.write();
        let node = Self::lookup(&tree, &key)?;
        if node.kind == FileKind::Directory && Self::has_children(&tree, &key) {
            return Err(FsError::Errno(libc::ENOTEMPTY));
        }
        tree.remove(&key);
        trace!(path = %key, "memfs: removed");
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = path::normalize(from)?;
        let to = path::normalize(to)?;
        if from.is_empty() || to.is_empty() {
            return Err(FsError::InvalidArgument("cannot rename the root".into()));
        }
        if from == to {
            return Ok(());
        }
        if path::starts_with(&to, &from) {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {from} into itself"
            )));
        }

        let mut tree = self.tree.write();
        let source = Self::lookup(&tree, &from)?;
        Self::check_parent(&tree, &to)?;

        if let Some(dest) = tree.get(&to) {
            match (source.kind, dest.kind) {
                (FileKind::Directory, FileKind::Directory) => {
                    if Self::has_children(&tree, &to) {
                        return Err(FsError::Errno(libc::ENOTEMPTY));
                    }
                }
                (FileKind::Directory, _) => return Err(FsError::Errno(libc::ENOTDIR)),
                (_, FileKind::Directory) => return Err(FsError::Errno(libc::EISDIR)),
                _ => {}
            }
            tree.remove(&to);
        }

        let moved: Vec<String> = tree
            .keys()
            .filter(|k| path::starts_with(k, &from))
            .cloned()
            .collect();
        for old_key in moved {
            if let (Some(node), Some(new_key)) =
                (tree.remove(&old_key), path::rebase(&old_key, &from, &to))
            {
                tree.insert(new_key, node);
            }
        }
        trace!(from = %from, to = %to, "memfs: renamed");
        Ok(())
    }

    fn as_dir(&self) -> Option<&dyn Dir> {
        Some(self)
    }

    fn as_symlink(&self) -> Option<&dyn Symlink> {
        Some(self)
    }

    fn as_change(&self) -> Option<&dyn Change> {
        Some(self)
    }
}

impl Dir for MemFs {
    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        let key = path::normalize(path)?;
        let mut tree = self.tree.write();
        let mut current = String::new();
        for component in key.split('/').filter(|c| !c.is_empty()) {
            current = path::join(&current, component)?;
            match tree.get(&current) {
                Some(node) if node.kind == FileKind::Directory => {}
                Some(_) => return Err(FsError::Errno(libc::ENOTDIR)),
                None => {
                    tree.insert(current.clone(), MemNode::new(FileKind::Directory, mode));
                }
            }
        }
        Ok(())
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        let node = Self::resolve_existing(&tree, &key)?;
        if node.kind != FileKind::Directory {
            return Err(FsError::Errno(libc::ENOTDIR));
        }
        let (dir_key, _) = Self::resolve(&tree, &key)?;
        let prefix = if dir_key.is_empty() {
            String::new()
        } else {
            format!("{dir_key}/")
        };

        let entries = tree
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k.is_empty() && !k[prefix.len()..].contains('/'))
            .map(|(k, node)| DirEntry {
                name: k[prefix.len()..].to_string(),
                metadata: node.metadata(),
            })
            .collect();
        Ok(entries)
    }
}

impl Symlink for MemFs {
    fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        let key = path::normalize(link)?;
        let mut tree = self.tree.write();
        if tree.contains_key(&key) {
            return Err(FsError::exists(key));
        }
        Self::check_parent(&tree, &key)?;
        tree.insert(key, MemNode::link(target));
        Ok(())
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        let node = Self::lookup(&tree, &key)?;
        if node.kind != FileKind::Symlink {
            return Err(FsError::InvalidArgument(format!("not a symlink: {key}")));
        }
        Ok(node.target.clone())
    }
}

impl Change for MemFs {
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        let node = Self::resolve_existing(&tree, &key)?;
        node.attrs.lock().perm = mode & PERM_MASK;
        Ok(())
    }

    fn lchown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        let node = Self::lookup(&tree, &key)?;
        let mut attrs = node.attrs.lock();
        if let Some(uid) = uid {
            attrs.uid = uid;
        }
        if let Some(gid) = gid {
            attrs.gid = gid;
        }
        Ok(())
    }

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> FsResult<()> {
        let key = path::normalize(path)?;
        let tree = self.tree.read();
        let node = Self::resolve_existing(&tree, &key)?;
        let mut attrs = node.attrs.lock();
        attrs.accessed = accessed;
        attrs.modified = modified;
        Ok(())
    }
}

/// A file opened from a [`MemFs`].
pub struct MemFile {
    name: String,
    node: Arc<MemNode>,
    flags: OpenFlags,
    cursor: Mutex<u64>,
    closed: AtomicBool,
    positioned: bool,
}

impl MemFile {
    fn check_open(&self) -> FsResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FsError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> FsResult<()> {
        self.check_open()?;
        if self.flags.writable() {
            Ok(())
        } else {
            Err(FsError::Errno(libc::EBADF))
        }
    }

    /// Writes `data` at `offset`, zero-filling any gap. The content lock is
    /// held for the whole copy, so a single call is never interleaved.
    fn write_into(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::Errno(libc::EFBIG))?;
        let start = to_index(offset)?;
        let mut content = self.node.data.write();
        if (content.len() as u64) < end {
            resize_content(&mut content, end)?;
        }
        content[start..start + data.len()].copy_from_slice(data);
        drop(content);
        self.node.touch();
        Ok(data.len())
    }
}

fn to_index(offset: u64) -> FsResult<usize> {
    usize::try_from(offset).map_err(|_| FsError::InvalidArgument(format!("offset {offset}")))
}

/// Resizes file content, zero-filling growth. Sizes above [`MAX_FILE_SIZE`]
/// fail with `EFBIG` and a failed allocation with `ENOSPC`.
fn resize_content(content: &mut Vec<u8>, size: u64) -> FsResult<()> {
    if size > MAX_FILE_SIZE {
        return Err(FsError::Errno(libc::EFBIG));
    }
    let size = usize::try_from(size).map_err(|_| FsError::Errno(libc::EFBIG))?;
    if let Some(extra) = size.checked_sub(content.len()) {
        content
            .try_reserve_exact(extra)
            .map_err(|_| FsError::Errno(libc::ENOSPC))?;
    }
    content.resize(size, 0);
    Ok(())
}

impl fmt::Debug for MemFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFile")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl File for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.check_open()?;
        if !self.flags.readable() {
            return Err(FsError::Errno(libc::EBADF));
        }
        let content = self.node.data.read();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= content.len() {
            return Ok(0);
        }
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        Ok(n)
    }

    fn write(&self, data: &[u8]) -> FsResult<usize> {
        self.check_writable()?;
        let mut cursor = self.cursor.lock();
        let offset = if self.flags.append() {
            self.node.data.read().len() as u64
        } else {
            *cursor
        };
        let n = self.write_into(offset, data)?;
        *cursor = offset + n as u64;
        Ok(n)
    }

    fn seek(&self, pos: SeekFrom) -> FsResult<u64> {
        self.check_open()?;
        let mut cursor = self.cursor.lock();
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => cursor.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.node.data.read().len() as u64).checked_add_signed(delta),
        };
        let target =
            target.ok_or_else(|| FsError::InvalidArgument(format!("invalid seek: {pos:?}")))?;
        *cursor = target;
        Ok(target)
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.check_writable()?;
        resize_content(&mut self.node.data.write(), size)?;
        self.node.touch();
        Ok(())
    }

    fn close(&self) -> FsResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(FsError::Closed);
        }
        Ok(())
    }

    fn as_write_at(&self) -> Option<&dyn WriteAt> {
        if self.positioned { Some(self) } else { None }
    }
}

impl WriteAt for MemFile {
    fn write_at(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.check_writable()?;
        self.write_into(offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(fs: &MemFs, path: &str, content: &[u8]) {
        let file = fs.open_file(path, OpenFlags::CREATE_WRITE, 0o644).unwrap();
        file.write(content).unwrap();
        file.close().unwrap();
    }

    fn read_file(fs: &MemFs, path: &str) -> Vec<u8> {
        let file = fs.open_file(path, OpenFlags::READ, 0).unwrap();
        let mut buf = vec![0u8; 4096];
        let n = file.read_at(&mut buf, 0).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_root_exists() {
        let fs = MemFs::new();
        let meta = fs.stat("").unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.permissions(), ROOT_PERM);
        assert!(fs.is_empty());
    }

    #[test]
    fn test_create_write_read() {
        let fs = MemFs::new();
        write_file(&fs, "hello.txt", b"Hello, World!");

        assert_eq!(read_file(&fs, "hello.txt"), b"Hello, World!");
        let meta = fs.stat("hello.txt").unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, 13);
        assert_eq!(meta.permissions(), 0o644);
    }

    #[test]
    fn test_open_missing_without_create() {
        let fs = MemFs::new();
        let err = fs.open_file("missing.txt", OpenFlags::READ, 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_exclusive_existing() {
        let fs = MemFs::new();
        write_file(&fs, "a.txt", b"a");
        let flags = OpenFlags::WRITE.with(libc::O_CREAT | libc::O_EXCL);
        let err = fs.open_file("a.txt", flags, 0o644).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_open_in_missing_parent() {
        let fs = MemFs::new();
        let err = fs
            .open_file("nope/a.txt", OpenFlags::CREATE_WRITE, 0o644)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_directory_as_file() {
        let fs = MemFs::new();
        fs.mkdir_all("dir", 0o755).unwrap();
        let err = fs.open_file("dir", OpenFlags::READ, 0).unwrap_err();
        assert!(matches!(err, FsError::Errno(libc::EISDIR)));
    }

    #[test]
    fn test_truncate_on_open() {
        let fs = MemFs::new();
        write_file(&fs, "a.txt", b"long content");
        write_file(&fs, "a.txt", b"short");
        assert_eq!(read_file(&fs, "a.txt"), b"short");
    }

    #[test]
    fn test_append_mode() {
        let fs = MemFs::new();
        write_file(&fs, "log.txt", b"one\n");
        let file = fs
            .open_file("log.txt", OpenFlags::WRITE.with(libc::O_APPEND), 0)
            .unwrap();
        file.write(b"two\n").unwrap();
        assert_eq!(read_file(&fs, "log.txt"), b"one\ntwo\n");
    }

    #[test]
    fn test_read_past_end() {
        let fs = MemFs::new();
        write_file(&fs, "a.txt", b"abc");
        let file = fs.open_file("a.txt", OpenFlags::READ, 0).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read_at(&mut buf, 2).unwrap(), 1);
        assert_eq!(file.read_at(&mut buf, 3).unwrap(), 0);
        assert_eq!(file.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn test_write_on_read_only_handle() {
        let fs = MemFs::new();
        write_file(&fs, "a.txt", b"abc");
        let file = fs.open_file("a.txt", OpenFlags::READ, 0).unwrap();
        assert!(matches!(file.write(b"x"), Err(FsError::Errno(libc::EBADF))));
    }

    #[test]
    fn test_seek_and_write_fills_gap() {
        let fs = MemFs::new();
        let file = fs
            .open_file("sparse.bin", OpenFlags::CREATE_WRITE, 0o644)
            .unwrap();
        assert_eq!(file.seek(SeekFrom::Start(4)).unwrap(), 4);
        file.write(b"xy").unwrap();
        assert_eq!(file.seek(SeekFrom::Current(0)).unwrap(), 6);
        assert_eq!(file.seek(SeekFrom::End(-1)).unwrap(), 5);
        assert!(file.seek(SeekFrom::Current(-10)).is_err());
        assert_eq!(read_file(&fs, "sparse.bin"), b"\0\0\0\0xy");
    }

    #[test]
    fn test_positioned_write_capability() {
        let fs = MemFs::new();
        let file = fs.open_file("a", OpenFlags::CREATE_WRITE, 0o644).unwrap();
        assert!(file.as_write_at().is_some());

        let fs = MemFs::new().without_positioned_writes();
        assert!(!fs.positioned_writes());
        let file = fs.open_file("a", OpenFlags::CREATE_WRITE, 0o644).unwrap();
        assert!(file.as_write_at().is_none());
    }

    #[test]
    fn test_close_twice() {
        let fs = MemFs::new();
        let file = fs.open_file("a", OpenFlags::CREATE_WRITE, 0o644).unwrap();
        file.close().unwrap();
        assert!(matches!(file.close(), Err(FsError::Closed)));
        assert!(matches!(file.write(b"x"), Err(FsError::Closed)));
    }

    #[test]
    fn test_mkdir_all_and_read_dir() {
        let fs = MemFs::new();
        fs.mkdir_all("a/b/c", 0o750).unwrap();
        write_file(&fs, "a/zeta.txt", b"z");
        write_file(&fs, "a/alpha.txt", b"a");
        fs.symlink("alpha.txt", "a/link").unwrap();

        assert!(fs.stat("a").unwrap().is_dir());
        assert!(fs.stat("a/b").unwrap().is_dir());
        assert_eq!(fs.stat("a/b/c").unwrap().permissions(), 0o750);

        let names: Vec<String> = fs.read_dir("a").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["alpha.txt", "b", "link", "zeta.txt"]);

        let root: Vec<String> = fs.read_dir("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(root, vec!["a"]);
    }

    #[test]
    fn test_mkdir_all_over_file() {
        let fs = MemFs::new();
        write_file(&fs, "file", b"");
        let err = fs.mkdir_all("file/sub", 0o755).unwrap_err();
        assert!(matches!(err, FsError::Errno(libc::ENOTDIR)));
    }

    #[test]
    fn test_read_dir_on_file() {
        let fs = MemFs::new();
        write_file(&fs, "file", b"");
        assert!(matches!(
            fs.read_dir("file"),
            Err(FsError::Errno(libc::ENOTDIR))
        ));
    }

    #[test]
    fn test_remove() {
        let fs = MemFs::new();
        fs.mkdir_all("dir", 0o755).unwrap();
        write_file(&fs, "dir/a.txt", b"a");

        assert!(matches!(
            fs.remove("dir"),
            Err(FsError::Errno(libc::ENOTEMPTY))
        ));
        fs.remove("dir/a.txt").unwrap();
        fs.remove("dir").unwrap();
        assert!(fs.stat("dir").unwrap_err().is_not_found());
        assert!(fs.remove("dir").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_does_not_confuse_siblings() {
        let fs = MemFs::new();
        fs.mkdir_all("dir", 0o755).unwrap();
        fs.mkdir_all("dir-other", 0o755).unwrap();
        write_file(&fs, "dir.txt", b"");
        fs.remove("dir").unwrap();
        assert!(fs.stat("dir-other").is_ok());
        assert!(fs.stat("dir.txt").is_ok());
    }

    #[test]
    fn test_rename_file() {
        let fs = MemFs::new();
        write_file(&fs, "a.txt", b"x");
        fs.rename("a.txt", "b.txt").unwrap();
        assert!(fs.stat("a.txt").unwrap_err().is_not_found());
        assert_eq!(read_file(&fs, "b.txt"), b"x");
    }

    #[test]
    fn test_rename_directory_moves_children() {
        let fs = MemFs::new();
        fs.mkdir_all("src/deep", 0o755).unwrap();
        write_file(&fs, "src/deep/file.txt", b"deep");
        fs.mkdir_all("dst", 0o755).unwrap();

        fs.rename("src", "dst/moved").unwrap();

        assert!(fs.stat("src").unwrap_err().is_not_found());
        assert!(fs.stat("dst/moved/deep").unwrap().is_dir());
        assert_eq!(read_file(&fs, "dst/moved/deep/file.txt"), b"deep");
    }

    #[test]
    fn test_rename_into_itself() {
        let fs = MemFs::new();
        fs.mkdir_all("a", 0o755).unwrap();
        assert!(matches!(
            fs.rename("a", "a/b"),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rename_over_existing_file() {
        let fs = MemFs::new();
        write_file(&fs, "a", b"new");
        write_file(&fs, "b", b"old");
        fs.rename("a", "b").unwrap();
        assert_eq!(read_file(&fs, "b"), b"new");
    }

    #[test]
    fn test_open_file_survives_rename() {
        let fs = MemFs::new();
        let file = fs.open_file("a", OpenFlags::CREATE_WRITE, 0o644).unwrap();
        fs.rename("a", "b").unwrap();
        file.write(b"still here").unwrap();
        assert_eq!(read_file(&fs, "b"), b"still here");
    }

    #[test]
    fn test_symlink_and_readlink() {
        let fs = MemFs::new();
        write_file(&fs, "target.txt", b"through the link");
        fs.symlink("target.txt", "link").unwrap();

        assert_eq!(fs.readlink("link").unwrap(), "target.txt");
        assert!(fs.stat("link").unwrap().is_symlink());
        assert_eq!(read_file(&fs, "link"), b"through the link");
        assert!(fs.symlink("x", "link").unwrap_err().is_already_exists());
        assert!(fs.readlink("target.txt").unwrap_err().is_invalid());
    }

    #[test]
    fn test_symlink_loop() {
        let fs = MemFs::new();
        fs.symlink("b", "a").unwrap();
        fs.symlink("a", "b").unwrap();
        assert!(matches!(
            fs.open_file("a", OpenFlags::READ, 0),
            Err(FsError::Errno(libc::ELOOP))
        ));
    }

    #[test]
    fn test_change_metadata() {
        let fs = MemFs::new();
        write_file(&fs, "a", b"");
        fs.chmod("a", 0o600).unwrap();
        fs.lchown("a", Some(1000), None).unwrap();
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs.chtimes("a", when, when).unwrap();

        let meta = fs.stat("a").unwrap();
        assert_eq!(meta.permissions(), 0o600);
        assert_eq!(meta.uid, Some(1000));
        assert_eq!(meta.gid, Some(0));
        assert_eq!(meta.modified, when);
        assert_eq!(meta.accessed, Some(when));
    }

    #[test]
    fn test_truncate() {
        let fs = MemFs::new();
        write_file(&fs, "a", b"0123456789");
        let file = fs.open_file("a", OpenFlags::WRITE, 0).unwrap();
        file.truncate(4).unwrap();
        assert_eq!(read_file(&fs, "a"), b"0123");
        file.truncate(6).unwrap();
        assert_eq!(read_file(&fs, "a"), b"0123\0\0");
    }

    #[test]
    fn test_size_limit() {
        let fs = MemFs::new();
        write_file(&fs, "a", b"abc");
        let file = fs.open_file("a", OpenFlags::READ_WRITE, 0).unwrap();
        let writer = file.as_write_at().unwrap();

        assert!(matches!(
            writer.write_at(b"x", 1 << 40),
            Err(FsError::Errno(libc::EFBIG))
        ));
        assert!(matches!(
            writer.write_at(b"xy", MAX_FILE_SIZE - 1),
            Err(FsError::Errno(libc::EFBIG))
        ));
        assert!(matches!(
            writer.write_at(b"x", u64::MAX),
            Err(FsError::Errno(libc::EFBIG))
        ));
        assert!(matches!(
            file.truncate(MAX_FILE_SIZE + 1),
            Err(FsError::Errno(libc::EFBIG))
        ));
        file.seek(SeekFrom::Start(1 << 40)).unwrap();
        assert!(matches!(file.write(b"x"), Err(FsError::Errno(libc::EFBIG))));

        // Rejected calls leave the content untouched
        assert_eq!(read_file(&fs, "a"), b"abc");
        assert_eq!(fs.stat("a").unwrap().size, 3);
    }

    #[test]
    fn test_path_escape() {
        let fs = MemFs::new();
        assert!(matches!(
            fs.stat("../etc/passwd"),
            Err(FsError::CrossedBoundary(_))
        ));
    }
}
