//! The fuser `Filesystem` implementation.
//!
//! [`CapFs`] maps kernel inodes and file handles onto [`Node`]s and
//! [`Handle`]s. Every callback is a thin wrapper: it resolves its inode or
//! handle, calls the matching kernel-independent method on `CapFs` and turns
//! the result into a reply. Those methods are public so the whole request
//! path can be exercised without mounting anything.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | init/destroy | destroy releases handles the kernel never released |
//! | lookup | increments nlookup via `get_or_insert` |
//! | forget/batch_forget | decrements nlookup, evicts at 0 |
//! | getattr/setattr | setattr verifies `fh` but changes by path |
//! | readlink/symlink | ENOSYS without the symlink capability |
//! | mkdir | ENOSYS without the directory capability |
//! | unlink/rmdir | both map to a single backing remove |
//! | rename | flags (RENAME_NOREPLACE, RENAME_EXCHANGE) are rejected |
//! | open/create/release | release runs on the worker pool |
//! | read/write | run on the worker pool |
//! | flush | nothing is buffered; only checks the handle |
//! | opendir/readdir/releasedir | readdir lists afresh, `.` and `..` first |
//! | statfs | fixed values |

use crate::attr::{Attr, BLOCK_SIZE, file_type};
use crate::config::MountConfig;
use crate::dispatch::WorkerPool;
use crate::error::{Errno, FuseResult, MountError};
use crate::handle::Handle;
use crate::handles::HandleTable;
use crate::inode::{InodeTable, ROOT_INODE};
use crate::node::{Node, Opened, SetTime, SetattrRequest};
use crate::root::Root;
use capfs_core::{OpenFlags, path};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use libc::c_int;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// Maximum filename length reported by statfs.
const NAME_MAX: u32 = 255;

/// One entry of a directory listing, as handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub ino: u64,
    /// Offset of the entry that follows this one.
    pub offset: i64,
    pub kind: FileType,
    pub name: String,
}

/// A FUSE filesystem serving a capability-based backend.
pub struct CapFs {
    root: Root,
    config: MountConfig,
    inodes: InodeTable,
    handles: HandleTable,
    pool: WorkerPool,
}

fn name_str(name: &OsStr) -> FuseResult<&str> {
    name.to_str().ok_or(Errno::EINVAL)
}

fn offset_u64(offset: i64) -> FuseResult<u64> {
    u64::try_from(offset).map_err(|_| Errno::EINVAL)
}

fn set_time(time: TimeOrNow) -> SetTime {
    match time {
        TimeOrNow::Now => SetTime::Now,
        TimeOrNow::SpecificTime(at) => SetTime::At(at),
    }
}

impl CapFs {
    /// Creates the filesystem and starts its worker pool.
    pub fn new(root: Root, config: MountConfig) -> Result<Self, MountError> {
        let pool = WorkerPool::new(config.worker_threads, config.queue_capacity)
            .map_err(|e| MountError::Init(format!("failed to start workers: {e}")))?;
        info!(capabilities = %root.capabilities(), "capfs filesystem created");
        Ok(Self {
            root,
            config,
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            pool,
        })
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    fn node(&self, ino: u64) -> FuseResult<Node> {
        let path = self.inodes.path(ino).ok_or(Errno::ENOENT)?;
        self.root.node_at(&path)
    }

    fn file_handle(&self, fh: u64) -> FuseResult<Arc<Handle>> {
        self.handles.file(fh).ok_or(Errno::EBADF)
    }

    fn file_attr(&self, ino: u64, attr: &Attr) -> FileAttr {
        attr.to_file_attr(ino, self.config.uid, self.config.gid)
    }

    /// Stats `node` and counts a kernel lookup for it.
    fn entry(&self, node: &Node) -> FuseResult<FileAttr> {
        let attr = node.attr()?;
        let ino = self.inodes.get_or_insert(node.path());
        Ok(self.file_attr(ino, &attr))
    }

    // ========================================================================
    // Kernel-independent operations
    // ========================================================================

    pub fn lookup_entry(&self, parent: u64, name: &str) -> FuseResult<FileAttr> {
        let child = self.node(parent)?.lookup(name)?;
        self.entry(&child)
    }

    pub fn get_attr(&self, ino: u64) -> FuseResult<FileAttr> {
        let attr = self.node(ino)?.attr()?;
        Ok(self.file_attr(ino, &attr))
    }

    /// Applies a setattr request. A kernel file handle, when given, must be
    /// open; the change itself is made by path.
    pub fn set_attr(&self, ino: u64, fh: Option<u64>, req: &SetattrRequest) -> FuseResult<FileAttr> {
        if let Some(fh) = fh
            && !self.handles.contains(fh)
        {
            warn!(inode = ino, fh, "setattr: unknown file handle");
            return Err(Errno::EBADF);
        }
        let node = self.node(ino)?;
        node.setattr(req)?;
        let attr = node.attr()?;
        Ok(self.file_attr(ino, &attr))
    }

    pub fn read_link(&self, ino: u64) -> FuseResult<String> {
        self.node(ino)?.readlink()
    }

    pub fn make_dir(&self, parent: u64, name: &str, mode: u32) -> FuseResult<FileAttr> {
        let child = self.node(parent)?.mkdir(name, mode)?;
        self.entry(&child)
    }

    pub fn make_symlink(&self, parent: u64, name: &str, target: &str) -> FuseResult<FileAttr> {
        let child = self.node(parent)?.symlink(target, name)?;
        self.entry(&child)
    }

    /// Removes `name` from `parent` (unlink and rmdir alike).
    pub fn remove_entry(&self, parent: u64, name: &str) -> FuseResult<()> {
        let node = self.node(parent)?;
        node.remove(name)?;
        if let Ok(child) = path::join(node.path(), name) {
            self.inodes.invalidate_path(&child);
        }
        Ok(())
    }

    pub fn rename_entry(
        &self,
        parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
        flags: u32,
    ) -> FuseResult<()> {
        if flags != 0 {
            debug!(flags, "rename: flags not supported");
            return Err(Errno::EINVAL);
        }
        let from_dir = self.node(parent)?;
        let to_dir = self.node(new_parent)?;
        from_dir.rename(name, &to_dir, new_name)?;
        if let (Ok(from), Ok(to)) = (
            path::join(from_dir.path(), name),
            path::join(to_dir.path(), new_name),
        ) {
            self.inodes.rename_path(&from, &to);
        }
        Ok(())
    }

    /// Creates and opens `name`; returns the attributes and the new handle id.
    pub fn create_file(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
        flags: i32,
    ) -> FuseResult<(FileAttr, u64)> {
        let (child, handle) =
            self.node(parent)?
                .create(name, OpenFlags::from_bits(flags), mode)?;
        let attr = match child.attr() {
            Ok(attr) => attr,
            Err(e) => {
                let _ = handle.release();
                return Err(e);
            }
        };
        let ino = self.inodes.get_or_insert(child.path());
        let fh = self.handles.insert_file(handle);
        Ok((self.file_attr(ino, &attr), fh))
    }

    pub fn open_file(&self, ino: u64, flags: i32) -> FuseResult<u64> {
        match self.node(ino)?.open(OpenFlags::from_bits(flags), false)? {
            Opened::File(handle) => Ok(self.handles.insert_file(handle)),
            Opened::Dir(dir) => Ok(self.handles.insert_dir(dir)),
        }
    }

    pub fn read_file(&self, fh: u64, offset: i64, size: u32) -> FuseResult<Vec<u8>> {
        self.file_handle(fh)?.read(offset_u64(offset)?, size as usize)
    }

    pub fn write_file(&self, fh: u64, offset: i64, data: &[u8]) -> FuseResult<usize> {
        self.file_handle(fh)?.write(offset_u64(offset)?, data)
    }

    pub fn flush_file(&self, fh: u64) -> FuseResult<()> {
        self.file_handle(fh).map(|_| ())
    }

    /// Forgets the handle id and closes the backing file.
    pub fn release_file(&self, fh: u64) -> FuseResult<()> {
        let handle = self.take_file(fh)?;
        handle.release()
    }

    fn take_file(&self, fh: u64) -> FuseResult<Arc<Handle>> {
        let handle = self.file_handle(fh)?;
        self.handles.remove(fh);
        Ok(handle)
    }

    pub fn open_dir(&self, ino: u64, flags: i32) -> FuseResult<u64> {
        match self.node(ino)?.open(OpenFlags::from_bits(flags), true)? {
            Opened::Dir(dir) => Ok(self.handles.insert_dir(dir)),
            Opened::File(handle) => Ok(self.handles.insert_file(handle)),
        }
    }

    /// Lists the directory behind `fh`, starting after `offset`.
    ///
    /// `.` and `..` come first, then the backing entries in backing order.
    /// The offset of each entry is its 1-based position in that sequence.
    pub fn list_dir(&self, ino: u64, fh: u64, offset: i64) -> FuseResult<Vec<ListedEntry>> {
        let dir = self.handles.dir(fh).ok_or(Errno::EBADF)?;
        let skip = usize::try_from(offset).map_err(|_| Errno::EINVAL)?;
        let entries = dir.read_dir_all()?;

        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            self.inodes
                .get_inode(path::parent(dir.path()))
                .unwrap_or(ROOT_INODE)
        };

        let mut listing = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in entries {
            let Ok(child) = path::join(dir.path(), &entry.name) else {
                debug!(name = %entry.name, "readdir: skipping unusable name");
                continue;
            };
            let child_ino = self.inodes.get_or_insert_no_lookup_inc(&child);
            listing.push((child_ino, file_type(entry.kind), entry.name));
        }

        Ok(listing
            .into_iter()
            .enumerate()
            .skip(skip)
            .map(|(i, (ino, kind, name))| ListedEntry {
                ino,
                offset: i64::try_from(i + 1).unwrap_or(i64::MAX),
                kind,
                name,
            })
            .collect())
    }

    pub fn release_dir(&self, fh: u64) -> FuseResult<()> {
        self.handles.dir(fh).ok_or(Errno::EBADF)?;
        self.handles.remove(fh);
        Ok(())
    }

    /// Releases every handle still open, e.g. at unmount.
    pub fn release_all(&self) -> usize {
        let files = self.handles.drain_files();
        let count = files.len();
        for handle in files {
            if let Err(e) = handle.release() {
                debug!(file = handle.name(), errno = e.code(), "release at shutdown failed");
            }
        }
        count
    }
}

impl Filesystem for CapFs {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        info!(
            workers = self.pool.threads(),
            capabilities = %self.root.capabilities(),
            "FUSE filesystem initialized"
        );
        // Reads on one handle may be answered out of order by the worker pool
        config.add_capabilities(fuser::consts::FUSE_ASYNC_READ).ok();
        Ok(())
    }

    fn destroy(&mut self) {
        let released = self.release_all();
        if released > 0 {
            debug!(released, "released handles left open by the kernel");
        }
        self.pool.shutdown();
        info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, ?name, "lookup");
        match name_str(name).and_then(|name| self.lookup_entry(parent, name)) {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        match self.get_attr(ino) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.code()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(inode = ino, ?mode, ?uid, ?gid, ?size, ?fh, "setattr");
        let req = SetattrRequest {
            mode,
            uid,
            gid,
            size,
            atime: atime.map(set_time),
            mtime: mtime.map(set_time),
            handle: None,
            lock_owner: None,
        };
        match self.set_attr(ino, fh, &req) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.code()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        trace!(inode = ino, "readlink");
        match self.read_link(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.code()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        trace!(parent, ?name, mode = format_args!("{mode:o}"), "mkdir");
        match name_str(name).and_then(|name| self.make_dir(parent, name, mode & !umask)) {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "unlink");
        match name_str(name).and_then(|name| self.remove_entry(parent, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        trace!(parent, ?name, "rmdir");
        match name_str(name).and_then(|name| self.remove_entry(parent, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        trace!(parent, ?link_name, ?target, "symlink");
        let result = name_str(link_name).and_then(|name| {
            let target = target.to_str().ok_or(Errno::EINVAL)?;
            self.make_symlink(parent, name, target)
        });
        match result {
            Ok(attr) => reply.entry(&self.config.entry_ttl, &attr, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        trace!(parent, ?name, newparent, ?newname, flags, "rename");
        let result = name_str(name).and_then(|name| {
            let newname = name_str(newname)?;
            self.rename_entry(parent, name, newparent, newname, flags)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        match self.open_file(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        let prepared = self
            .file_handle(fh)
            .and_then(|handle| Ok((handle, offset_u64(offset)?)));
        let (handle, offset) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return reply.error(e.code()),
        };
        self.pool.execute(move || match handle.read(offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.code()),
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset, len = data.len(), "write");
        let prepared = self
            .file_handle(fh)
            .and_then(|handle| Ok((handle, offset_u64(offset)?)));
        let (handle, offset) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return reply.error(e.code()),
        };
        let data = data.to_vec();
        self.pool.execute(move || match handle.write(offset, &data) {
            Ok(n) => reply.written(u32::try_from(n).unwrap_or(u32::MAX)),
            Err(e) => reply.error(e.code()),
        });
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "flush");
        match self.flush_file(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(inode = ino, fh, "release");
        let handle = match self.take_file(fh) {
            Ok(handle) => handle,
            Err(e) => return reply.error(e.code()),
        };
        self.pool.execute(move || match handle.release() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        match self.open_dir(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, fh, offset, "readdir");
        match self.list_dir(ino, fh, offset) {
            Ok(entries) => {
                for entry in entries {
                    // add() returns true once the reply buffer is full
                    if reply.add(entry.ino, entry.offset, entry.kind, &entry.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(e.code()),
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "releasedir");
        match self.release_dir(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.code()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        trace!(parent, ?name, mode = format_args!("{mode:o}"), flags, "create");
        match name_str(name).and_then(|name| self.create_file(parent, name, mode & !umask, flags)) {
            Ok((attr, fh)) => reply.created(&self.config.entry_ttl, &attr, 0, fh, 0),
            Err(e) => reply.error(e.code()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capfs_core::MemFs;

    fn setup() -> CapFs {
        let config = MountConfig::default().worker_threads(0).owner(1000, 1000);
        CapFs::new(Root::new(Arc::new(MemFs::new())), config).unwrap()
    }

    #[test]
    fn test_root_attr() {
        let fs = setup();
        let attr = fs.get_attr(ROOT_INODE).unwrap();
        assert_eq!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.uid, 1000);
    }

    #[test]
    fn test_unknown_inode() {
        let fs = setup();
        assert_eq!(fs.get_attr(999).unwrap_err(), Errno::ENOENT);
    }

    #[test]
    fn test_lookup_counts_and_forget() {
        let fs = setup();
        fs.make_dir(ROOT_INODE, "d", 0o755).unwrap();
        let attr = fs.lookup_entry(ROOT_INODE, "d").unwrap();
        assert_eq!(fs.inodes().get(attr.ino).unwrap().nlookup(), 2);
        assert!(!fs.inodes().forget(attr.ino, 1));
        assert!(fs.inodes().forget(attr.ino, 1));
        assert!(fs.inodes().get(attr.ino).is_none());
    }

    #[test]
    fn test_lookup_missing_does_not_allocate() {
        let fs = setup();
        assert_eq!(fs.lookup_entry(ROOT_INODE, "nope").unwrap_err(), Errno::ENOENT);
        assert!(fs.inodes().is_empty());
    }

    #[test]
    fn test_readdir_offsets() {
        let fs = setup();
        for name in ["a", "b", "c"] {
            let (_, fh) = fs.create_file(ROOT_INODE, name, 0o644, libc::O_WRONLY).unwrap();
            fs.release_file(fh).unwrap();
        }
        let fh = fs.open_dir(ROOT_INODE, 0).unwrap();

        let all = fs.list_dir(ROOT_INODE, fh, 0).unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "a", "b", "c"]);
        let offsets: Vec<i64> = all.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4, 5]);
        assert_eq!(all[0].ino, ROOT_INODE);
        assert_eq!(all[1].ino, ROOT_INODE);

        // Resuming after the third entry
        let rest = fs.list_dir(ROOT_INODE, fh, 3).unwrap();
        let names: Vec<&str> = rest.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(fs.list_dir(ROOT_INODE, fh, 5).unwrap().is_empty());

        fs.release_dir(fh).unwrap();
        assert_eq!(fs.list_dir(ROOT_INODE, fh, 0).unwrap_err(), Errno::EBADF);
    }

    #[test]
    fn test_readdir_does_not_count_lookups() {
        let fs = setup();
        let (attr, fh) = fs.create_file(ROOT_INODE, "f", 0o644, libc::O_WRONLY).unwrap();
        fs.release_file(fh).unwrap();
        let dir = fs.open_dir(ROOT_INODE, 0).unwrap();
        let listing = fs.list_dir(ROOT_INODE, dir, 0).unwrap();
        assert_eq!(listing[2].ino, attr.ino);
        assert_eq!(fs.inodes().get(attr.ino).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_setattr_with_unknown_handle() {
        let fs = setup();
        let (attr, _fh) = fs.create_file(ROOT_INODE, "f", 0o644, libc::O_RDWR).unwrap();
        let req = SetattrRequest {
            size: Some(0),
            ..Default::default()
        };
        assert_eq!(fs.set_attr(attr.ino, Some(4242), &req).unwrap_err(), Errno::EBADF);
    }

    #[test]
    fn test_ftruncate_through_open_handle() {
        let fs = setup();
        let (attr, fh) = fs.create_file(ROOT_INODE, "f", 0o644, libc::O_RDWR).unwrap();
        fs.write_file(fh, 0, b"0123456789").unwrap();
        let req = SetattrRequest {
            size: Some(3),
            ..Default::default()
        };
        let updated = fs.set_attr(attr.ino, Some(fh), &req).unwrap();
        assert_eq!(updated.size, 3);
        assert_eq!(fs.read_file(fh, 0, 100).unwrap(), b"012");
    }

    #[test]
    fn test_rename_flags_rejected() {
        let fs = setup();
        let (_, fh) = fs.create_file(ROOT_INODE, "a", 0o644, libc::O_WRONLY).unwrap();
        fs.release_file(fh).unwrap();
        assert_eq!(
            fs.rename_entry(ROOT_INODE, "a", ROOT_INODE, "b", 1).unwrap_err(),
            Errno::EINVAL
        );
    }

    #[test]
    fn test_rename_keeps_inode() {
        let fs = setup();
        let (attr, fh) = fs.create_file(ROOT_INODE, "a", 0o644, libc::O_WRONLY).unwrap();
        fs.release_file(fh).unwrap();
        fs.rename_entry(ROOT_INODE, "a", ROOT_INODE, "b", 0).unwrap();
        assert_eq!(fs.inodes().path(attr.ino).as_deref(), Some("b"));
        assert_eq!(fs.get_attr(attr.ino).unwrap().ino, attr.ino);
    }

    #[test]
    fn test_remove_invalidates_path() {
        let fs = setup();
        let (attr, fh) = fs.create_file(ROOT_INODE, "gone", 0o644, libc::O_WRONLY).unwrap();
        fs.release_file(fh).unwrap();
        fs.remove_entry(ROOT_INODE, "gone").unwrap();
        assert!(fs.inodes().get_inode("gone").is_none());
        assert_eq!(fs.get_attr(attr.ino).unwrap_err(), Errno::ENOENT);
    }

    #[test]
    fn test_release_unknown_handle() {
        let fs = setup();
        assert_eq!(fs.release_file(77).unwrap_err(), Errno::EBADF);
        assert_eq!(fs.flush_file(77).unwrap_err(), Errno::EBADF);
        assert_eq!(fs.read_file(77, 0, 1).unwrap_err(), Errno::EBADF);
    }

    #[test]
    fn test_negative_offset() {
        let fs = setup();
        let (_, fh) = fs.create_file(ROOT_INODE, "f", 0o644, libc::O_RDWR).unwrap();
        assert_eq!(fs.read_file(fh, -1, 1).unwrap_err(), Errno::EINVAL);
        assert_eq!(fs.write_file(fh, -1, b"x").unwrap_err(), Errno::EINVAL);
    }

    #[test]
    fn test_release_all() {
        let fs = setup();
        fs.create_file(ROOT_INODE, "a", 0o644, libc::O_WRONLY).unwrap();
        fs.create_file(ROOT_INODE, "b", 0o644, libc::O_WRONLY).unwrap();
        assert_eq!(fs.release_all(), 2);
        assert!(fs.handles().is_empty());
    }
}
