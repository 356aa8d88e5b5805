//! Wrapper that hides optional capabilities of another backend.

use crate::capability::{Basic, Capabilities, Change, Dir, File, Symlink};
use crate::error::FsResult;
use crate::metadata::{Metadata, OpenFlags};

/// A backend exposing only a chosen subset of its inner capabilities.
///
/// A capability is offered when the inner backend has it and the
/// allowed set contains it.
///
/// ```
/// use capfs_core::{Basic, Capabilities, Capability, MemFs, Restricted};
///
/// let fs = Restricted::new(MemFs::new(), Capabilities::ALL.without(Capability::Change));
/// assert!(fs.as_dir().is_some());
/// assert!(fs.as_change().is_none());
/// ```
#[derive(Debug)]
pub struct Restricted<B> {
    inner: B,
    allowed: Capabilities,
}

impl<B: Basic> Restricted<B> {
    pub fn new(inner: B, allowed: Capabilities) -> Self {
        Self { inner, allowed }
    }

    /// Only the required [`Basic`] contract.
    pub fn basic_only(inner: B) -> Self {
        Self::new(inner, Capabilities::NONE)
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// The capabilities actually offered.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::of(self)
    }
}

impl<B: Basic> Basic for Restricted<B> {
    fn stat(&self, path: &str) -> FsResult<Metadata> {
        self.inner.stat(path)
    }

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>> {
        self.inner.open_file(path, flags, mode)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.inner.remove(path)
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.inner.rename(from, to)
    }

    fn as_dir(&self) -> Option<&dyn Dir> {
        self.allowed.dir.then(|| self.inner.as_dir()).flatten()
    }

    fn as_symlink(&self) -> Option<&dyn Symlink> {
        self.allowed.symlink.then(|| self.inner.as_symlink()).flatten()
    }

    fn as_change(&self) -> Option<&dyn Change> {
        self.allowed.change.then(|| self.inner.as_change()).flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::memfs::MemFs;

    #[test]
    fn test_basic_only_hides_everything() {
        let fs = Restricted::basic_only(MemFs::new());
        assert_eq!(fs.capabilities(), Capabilities::NONE);
        assert!(fs.as_dir().is_none());
        assert!(fs.as_symlink().is_none());
        assert!(fs.as_change().is_none());
    }

    #[test]
    fn test_basic_operations_pass_through() {
        let fs = Restricted::basic_only(MemFs::new());
        let file = fs.open_file("a", OpenFlags::CREATE_WRITE, 0o644).unwrap();
        file.write(b"abc").unwrap();
        file.close().unwrap();
        fs.rename("a", "b").unwrap();
        assert_eq!(fs.stat("b").unwrap().size, 3);
        fs.remove("b").unwrap();
        assert!(fs.inner().is_empty());
    }

    #[test]
    fn test_selected_capabilities() {
        let fs = Restricted::new(MemFs::new(), Capabilities::NONE.with(Capability::Symlink));
        let caps = fs.capabilities();
        assert!(!caps.dir);
        assert!(caps.symlink);
        assert!(!caps.change);
    }
}
