//! Per-path operations.
//!
//! A [`Node`] is a path in the mounted tree plus the shared [`Root`]. Nodes
//! are plain values: they are not cached, and two nodes are equal when their
//! paths are equal. Every operation runs the call hook first, then performs
//! the matching calls on the backing filesystem and translates the result.

use crate::attr::Attr;
use crate::error::{Errno, FuseResult, translate};
use crate::handle::{DirHandle, Handle};
use crate::hook::Call;
use crate::root::Root;
use capfs_core::{OpenFlags, path};
use std::fmt;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Mode used when opening an existing file.
const OPEN_MODE: u32 = 0o777;

/// A timestamp requested by a setattr call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    /// The time at which the request is processed.
    Now,
    At(SystemTime),
}

impl SetTime {
    fn resolve(self, now: SystemTime) -> SystemTime {
        match self {
            SetTime::Now => now,
            SetTime::At(time) => time,
        }
    }
}

/// The fields a setattr call asks to change. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetattrRequest {
    /// Permission bits.
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<SetTime>,
    pub mtime: Option<SetTime>,
    /// An open file handle the change should go through. Not supported.
    pub handle: Option<u64>,
    /// A lock owner the change is made on behalf of. Not supported.
    pub lock_owner: Option<u64>,
}

impl SetattrRequest {
    fn changes_metadata(&self) -> bool {
        self.mode.is_some()
            || self.uid.is_some()
            || self.gid.is_some()
            || self.atime.is_some()
            || self.mtime.is_some()
    }
}

/// Result of [`Node::open`].
#[derive(Debug)]
pub enum Opened {
    File(Handle),
    Dir(DirHandle),
}

/// A path in the mounted tree.
#[derive(Clone)]
pub struct Node {
    root: Root,
    path: String,
}

impl Node {
    pub(crate) fn new(root: Root, path: String) -> Self {
        Self { root, path }
    }

    /// The slash-separated path relative to the root (`""` for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    fn child_path(&self, name: &str) -> FuseResult<String> {
        translate(path::join(&self.path, name))
    }

    /// Stats the node.
    pub fn attr(&self) -> FuseResult<Attr> {
        self.root.check(&Call::Attr { path: &self.path })?;
        let meta = translate(self.root.fs().stat(&self.path))?;
        Ok(Attr::from(&meta))
    }

    /// The child node `name`. Existence is not checked.
    pub fn lookup(&self, name: &str) -> FuseResult<Node> {
        self.root.check(&Call::Lookup {
            path: &self.path,
            name,
        })?;
        let child = self.child_path(name)?;
        Ok(Node::new(self.root.clone(), child))
    }

    /// Creates the directory `name`, including any missing intermediates.
    pub fn mkdir(&self, name: &str, mode: u32) -> FuseResult<Node> {
        self.root.check(&Call::Mkdir {
            path: &self.path,
            name,
            mode,
        })?;
        let Some(dirs) = self.root.fs().as_dir() else {
            debug!(path = %self.path, "mkdir: backing filesystem has no directory support");
            return Err(Errno::ENOSYS);
        };
        let child = self.child_path(name)?;
        translate(dirs.mkdir_all(&child, mode))?;
        Ok(Node::new(self.root.clone(), child))
    }

    /// Removes the child `name`, whatever its type.
    pub fn remove(&self, name: &str) -> FuseResult<()> {
        self.root.check(&Call::Remove {
            path: &self.path,
            name,
        })?;
        let child = self.child_path(name)?;
        translate(self.root.fs().remove(&child))
    }

    /// Creates the link `name` pointing at `target`.
    pub fn symlink(&self, target: &str, name: &str) -> FuseResult<Node> {
        self.root.check(&Call::Symlink {
            path: &self.path,
            target,
            name,
        })?;
        let Some(links) = self.root.fs().as_symlink() else {
            debug!(path = %self.path, "symlink: backing filesystem has no symlink support");
            return Err(Errno::ENOSYS);
        };
        let child = self.child_path(name)?;
        translate(links.symlink(target, &child))?;
        Ok(Node::new(self.root.clone(), child))
    }

    pub fn readlink(&self) -> FuseResult<String> {
        self.root.check(&Call::Readlink { path: &self.path })?;
        let Some(links) = self.root.fs().as_symlink() else {
            debug!(path = %self.path, "readlink: backing filesystem has no symlink support");
            return Err(Errno::ENOSYS);
        };
        translate(links.readlink(&self.path))
    }

    /// Moves the child `old_name` to `new_name` under `new_dir`.
    pub fn rename(&self, old_name: &str, new_dir: &Node, new_name: &str) -> FuseResult<()> {
        self.root.check(&Call::Rename {
            path: &self.path,
            old_name,
            new_dir: &new_dir.path,
            new_name,
        })?;
        let from = self.child_path(old_name)?;
        let to = new_dir.child_path(new_name)?;
        translate(self.root.fs().rename(&from, &to))
    }

    /// Applies the requested attribute changes.
    ///
    /// Mode, ownership and times need the change capability; size does
    /// not. Sub-steps run in order (mode, ownership, times, size) and the
    /// first failure is returned without undoing earlier ones.
    pub fn setattr(&self, req: &SetattrRequest) -> FuseResult<()> {
        self.root.check(&Call::Setattr {
            path: &self.path,
            request: req,
        })?;
        if req.handle.is_some() || req.lock_owner.is_some() {
            warn!(
                path = %self.path,
                handle = ?req.handle,
                lock_owner = ?req.lock_owner,
                "setattr: handle and lock owner are not supported"
            );
            return Err(Errno::ENOTSUP);
        }

        let fs = self.root.fs();
        let now = SystemTime::now();
        let atime = req.atime.map(|t| t.resolve(now));
        let mtime = req.mtime.map(|t| t.resolve(now));

        if req.changes_metadata() {
            let Some(change) = fs.as_change() else {
                debug!(path = %self.path, "setattr: backing filesystem has no change support");
                return Err(Errno::ENOTSUP);
            };
            if let Some(mode) = req.mode {
                translate(change.chmod(&self.path, mode))?;
            }
            if req.uid.is_some() || req.gid.is_some() {
                translate(change.lchown(&self.path, req.uid, req.gid))?;
            }
            if atime.is_some() || mtime.is_some() {
                let (accessed, modified) = match (atime, mtime) {
                    (Some(a), Some(m)) => (a, m),
                    _ => {
                        let meta = translate(fs.stat(&self.path))?;
                        let current_atime = meta.accessed.unwrap_or(meta.modified);
                        (
                            atime.unwrap_or(current_atime),
                            mtime.unwrap_or(meta.modified),
                        )
                    }
                };
                translate(change.chtimes(&self.path, accessed, modified))?;
            }
        }

        if let Some(size) = req.size {
            let file = translate(fs.open_file(&self.path, OpenFlags::WRITE, OPEN_MODE))?;
            let truncated = file.truncate(size);
            let closed = file.close();
            translate(truncated)?;
            translate(closed)?;
        }
        trace!(path = %self.path, ?req, "setattr applied");
        Ok(())
    }

    /// Creates (or opens, depending on `flags`) the file `name`.
    pub fn create(&self, name: &str, flags: OpenFlags, mode: u32) -> FuseResult<(Node, Handle)> {
        self.root.check(&Call::Create {
            path: &self.path,
            name,
            flags,
            mode,
        })?;
        let child = self.child_path(name)?;
        let file = translate(self.root.fs().open_file(
            &child,
            flags.with(libc::O_CREAT),
            mode,
        ))?;
        let handle = Handle::new(self.root.clone(), file);
        Ok((Node::new(self.root.clone(), child), handle))
    }

    /// Opens the node.
    ///
    /// Directories are not opened on the backing filesystem; the returned
    /// [`DirHandle`] lists the path when asked.
    pub fn open(&self, flags: OpenFlags, dir: bool) -> FuseResult<Opened> {
        self.root.check(&Call::Open {
            path: &self.path,
            flags,
            dir,
        })?;
        if dir {
            return Ok(Opened::Dir(DirHandle::new(
                self.root.clone(),
                self.path.clone(),
            )));
        }
        let file = translate(self.root.fs().open_file(&self.path, flags, OPEN_MODE))?;
        Ok(Opened::File(Handle::new(self.root.clone(), file)))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capfs_core::{Basic, MemFs};
    use std::sync::Arc;

    fn setup() -> (Arc<MemFs>, Root) {
        let fs = Arc::new(MemFs::new());
        let root = Root::new(fs.clone());
        (fs, root)
    }

    #[test]
    fn test_lookup_does_not_check_existence() {
        let (_fs, root) = setup();
        let child = root.node().lookup("missing").unwrap();
        assert_eq!(child.path(), "missing");
        assert_eq!(child.attr().unwrap_err(), Errno::ENOENT);
    }

    #[test]
    fn test_lookup_rejects_bad_names() {
        let (_fs, root) = setup();
        assert_eq!(root.node().lookup("..").unwrap_err(), Errno::EINVAL);
        assert_eq!(root.node().lookup("a/b").unwrap_err(), Errno::EINVAL);
        assert_eq!(root.node().lookup("").unwrap_err(), Errno::EINVAL);
    }

    #[test]
    fn test_node_equality_is_path_equality() {
        let (_fs, root) = setup();
        let other_root = Root::new(Arc::new(MemFs::new()));
        assert_eq!(
            root.node().lookup("a").unwrap(),
            other_root.node().lookup("a").unwrap()
        );
        assert_ne!(root.node().lookup("a").unwrap(), root.node().lookup("b").unwrap());
    }

    #[test]
    fn test_mkdir_nested() {
        let (fs, root) = setup();
        let a = root.node().mkdir("a", 0o755).unwrap();
        let b = a.mkdir("b", 0o700).unwrap();
        assert_eq!(b.path(), "a/b");
        assert!(fs.stat("a/b").unwrap().is_dir());
        assert_eq!(b.attr().unwrap().mode & 0o777, 0o700);
    }

    #[test]
    fn test_create_open_read() {
        let (_fs, root) = setup();
        let (node, handle) = root
            .node()
            .create("f.txt", OpenFlags::READ_WRITE, 0o644)
            .unwrap();
        assert_eq!(handle.write(0, b"hello").unwrap(), 5);
        handle.release().unwrap();
        assert_eq!(node.attr().unwrap().size, 5);

        let Opened::File(handle) = node.open(OpenFlags::READ, false).unwrap() else {
            panic!("expected a file handle");
        };
        assert_eq!(handle.read(0, 100).unwrap(), b"hello");
    }

    #[test]
    fn test_open_dir_does_not_touch_backend() {
        let (_fs, root) = setup();
        // The path does not exist; opening it as a directory still succeeds
        let node = root.node().lookup("ghost").unwrap();
        let Opened::Dir(dir) = node.open(OpenFlags::READ, true).unwrap() else {
            panic!("expected a directory handle");
        };
        assert_eq!(dir.path(), "ghost");
    }

    #[test]
    fn test_setattr_rejects_handle_before_changes() {
        let (fs, root) = setup();
        let (node, handle) = root.node().create("f", OpenFlags::WRITE, 0o644).unwrap();
        handle.release().unwrap();

        let req = SetattrRequest {
            mode: Some(0o600),
            handle: Some(3),
            ..Default::default()
        };
        assert_eq!(node.setattr(&req).unwrap_err(), Errno::ENOTSUP);
        assert_eq!(fs.stat("f").unwrap().permissions(), 0o644);

        let req = SetattrRequest {
            lock_owner: Some(9),
            ..Default::default()
        };
        assert_eq!(node.setattr(&req).unwrap_err(), Errno::ENOTSUP);
    }

    #[test]
    fn test_setattr_mode_and_owner() {
        let (fs, root) = setup();
        let (node, handle) = root.node().create("f", OpenFlags::WRITE, 0o644).unwrap();
        handle.release().unwrap();

        let req = SetattrRequest {
            mode: Some(0o600),
            gid: Some(50),
            ..Default::default()
        };
        node.setattr(&req).unwrap();
        let meta = fs.stat("f").unwrap();
        assert_eq!(meta.permissions(), 0o600);
        assert_eq!(meta.gid, Some(50));
        assert_eq!(meta.uid, Some(0));
    }

    #[test]
    fn test_setattr_mtime_keeps_atime() {
        let (fs, root) = setup();
        let (node, handle) = root.node().create("f", OpenFlags::WRITE, 0o644).unwrap();
        handle.release().unwrap();
        let early = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let late = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(2000);

        node.setattr(&SetattrRequest {
            atime: Some(SetTime::At(early)),
            mtime: Some(SetTime::At(early)),
            ..Default::default()
        })
        .unwrap();
        node.setattr(&SetattrRequest {
            mtime: Some(SetTime::At(late)),
            ..Default::default()
        })
        .unwrap();

        let meta = fs.stat("f").unwrap();
        assert_eq!(meta.modified, late);
        assert_eq!(meta.accessed, Some(early));
    }

    #[test]
    fn test_setattr_atime_now_sets_atime() {
        let (fs, root) = setup();
        let (node, handle) = root.node().create("f", OpenFlags::WRITE, 0o644).unwrap();
        handle.release().unwrap();
        let old = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        fs.as_change().unwrap().chtimes("f", old, old).unwrap();

        let before = SystemTime::now();
        node.setattr(&SetattrRequest {
            atime: Some(SetTime::Now),
            ..Default::default()
        })
        .unwrap();

        let meta = fs.stat("f").unwrap();
        assert!(meta.accessed.unwrap() >= before);
        assert_eq!(meta.modified, old);
    }

    #[test]
    fn test_readlink_on_symlink() {
        let (_fs, root) = setup();
        let link = root.node().symlink("target/path", "l").unwrap();
        assert_eq!(link.readlink().unwrap(), "target/path");
        assert_eq!(link.attr().unwrap().kind(), capfs_core::FileKind::Symlink);
    }

    #[test]
    fn test_remove_missing() {
        let (_fs, root) = setup();
        assert_eq!(root.node().remove("nope").unwrap_err(), Errno::ENOENT);
    }
}
