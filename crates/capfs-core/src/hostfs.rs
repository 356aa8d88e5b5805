//! Filesystem backed by a directory on the host.
//!
//! Every path is normalized and resolved beneath the base directory, so `..`
//! can never leave it. Symlinks met while resolving are followed relative to
//! the base as well: an absolute target, or a relative one climbing above the
//! base, is a boundary crossing. Symlinks stored inside the tree are created
//! and reported verbatim; `stat` and directory listings do not follow them.

use crate::capability::{Basic, Change, Dir, File, Symlink, WriteAt};
use crate::error::{FsError, FsResult};
use crate::metadata::{DirEntry, Metadata, OpenFlags, PERM_MASK};
use crate::path;
use filetime::FileTime;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fs::{self, Permissions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Converts a host I/O error.
///
/// Errors whose kind the mount layer recognises stay as [`FsError::Io`];
/// anything else that carries an OS code keeps that exact code.
fn host_err(err: io::Error) -> FsError {
    match err.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::AlreadyExists
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::Unsupported => FsError::Io(err),
        _ => match err.raw_os_error() {
            Some(code) => FsError::Errno(code),
            None => FsError::Io(err),
        },
    }
}

/// Symlinks followed while resolving one path before giving up with `ELOOP`.
const MAX_LINK_HOPS: usize = 40;

fn to_metadata(meta: &fs::Metadata) -> Metadata {
    Metadata {
        mode: meta.mode(),
        size: meta.len(),
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        accessed: meta.accessed().ok(),
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
    }
}

/// A filesystem rooted at a host directory.
#[derive(Debug, Clone)]
pub struct HostFs {
    base: PathBuf,
}

impl HostFs {
    /// Creates a filesystem rooted at `base`, which must be an existing directory.
    pub fn new(base: impl Into<PathBuf>) -> FsResult<Self> {
        let base = base.into();
        let meta = fs::metadata(&base).map_err(host_err)?;
        if !meta.is_dir() {
            return Err(FsError::Errno(libc::ENOTDIR));
        }
        debug!(base = %base.display(), "host filesystem opened");
        Ok(Self { base })
    }

    /// The host directory backing this filesystem.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Host path for `path`, leaving a final symlink unfollowed.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        self.walk(path, false)
    }

    /// Host path for `path`, following a final symlink as well.
    fn resolve_follow(&self, path: &str) -> FsResult<PathBuf> {
        self.walk(path, true)
    }

    /// Resolves `path` one component at a time beneath the base.
    ///
    /// Missing components are taken as they are so that create-style calls
    /// can name new entries.
    fn walk(&self, path: &str, follow_last: bool) -> FsResult<PathBuf> {
        let rel = path::normalize(path)?;
        let mut pending: VecDeque<String> = rel
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        let mut resolved = self.base.clone();
        let mut depth = 0usize;
        let mut hops = 0usize;

        while let Some(component) = pending.pop_front() {
            match component.as_str() {
                "." => continue,
                ".." => {
                    if depth == 0 {
                        return Err(FsError::CrossedBoundary(path.to_string()));
                    }
                    resolved.pop();
                    depth -= 1;
                    continue;
                }
                _ => {}
            }

            let candidate = resolved.join(&component);
            let follow = follow_last || !pending.is_empty();
            let is_link = follow
                && fs::symlink_metadata(&candidate).is_ok_and(|m| m.file_type().is_symlink());
            if !is_link {
                resolved = candidate;
                depth += 1;
                continue;
            }

            hops += 1;
            if hops > MAX_LINK_HOPS {
                return Err(FsError::Errno(libc::ELOOP));
            }
            let target = fs::read_link(&candidate).map_err(host_err)?;
            if target.is_absolute() {
                return Err(FsError::CrossedBoundary(path.to_string()));
            }
            let target = target
                .to_str()
                .ok_or_else(|| FsError::InvalidArgument(format!("non-UTF-8 link target in {path}")))?;
            trace!(path, link = %component, target, "hostfs: following link");
            for part in target.split('/').rev().filter(|c| !c.is_empty()) {
                pending.push_front(part.to_owned());
            }
        }
        Ok(resolved)
    }
}

impl Basic for HostFs {
    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(full).map_err(host_err)?;
        Ok(to_metadata(&meta))
    }

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>> {
        let name = path::normalize(path)?;
        let full = self.resolve_follow(&name)?;

        // The flags go to the host as they are, so a create without write
        // access works. The final component was resolved above and must not
        // have turned into a link since.
        let mut oflag =
            OFlag::from_bits_truncate(flags.bits()) | OFlag::O_CLOEXEC | OFlag::O_NOFOLLOW;
        if !flags.writable() {
            oflag.remove(OFlag::O_TRUNC);
        }
        let mode = Mode::from_bits_truncate((mode & PERM_MASK) as libc::mode_t);
        let fd = nix::fcntl::open(full.as_path(), oflag, mode)
            .map_err(|errno| host_err(errno.into()))?;
        let file = fs::File::from(fd);

        if file.metadata().map_err(host_err)?.is_dir() {
            return Err(FsError::Errno(libc::EISDIR));
        }
        trace!(path = %name, ?flags, "hostfs: opened");
        Ok(Box::new(HostFile {
            name,
            file: RwLock::new(Some(file)),
        }))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path)?;
        if full == self.base {
            return Err(FsError::InvalidArgument("cannot remove the root".into()));
        }
        let meta = fs::symlink_metadata(&full).map_err(host_err)?;
        if meta.is_dir() {
            fs::remove_dir(&full).map_err(host_err)
        } else {
            fs::remove_file(&full).map_err(host_err)
        }
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        fs::rename(from, to).map_err(host_err)
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

impl Dir for HostFs {
    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        let full = self.resolve_follow(path)?;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode & PERM_MASK)
            .create(full)
            .map_err(host_err)
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let full = self.resolve_follow(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(full).map_err(host_err)? {
            let entry = entry.map_err(host_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Entries can vanish between the listing and the stat
            let meta = match fs::symlink_metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(host_err(e)),
            };
            entries.push(DirEntry {
                name,
                metadata: to_metadata(&meta),
            });
        }
        Ok(entries)
    }
}

impl Symlink for HostFs {
    fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        let full = self.resolve(link)?;
        std::os::unix::fs::symlink(target, full).map_err(host_err)
    }

    fn readlink(&self, path: &str) -> FsResult<String> {
        let full = self.resolve(path)?;
        let target = fs::read_link(full).map_err(host_err)?;
        Ok(target.to_string_lossy().into_owned())
    }
}

impl Change for HostFs {
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let full = self.resolve_follow(path)?;
        fs::set_permissions(full, Permissions::from_mode(mode & PERM_MASK)).map_err(host_err)
    }

    fn lchown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let full = self.resolve(path)?;
        std::os::unix::fs::lchown(full, uid, gid).map_err(host_err)
    }

    fn chtimes(&self, path: &str, accessed: SystemTime, modified: SystemTime) -> FsResult<()> {
        let full = self.resolve_follow(path)?;
        filetime::set_file_times(
            full,
            FileTime::from_system_time(accessed),
            FileTime::from_system_time(modified),
        )
        .map_err(host_err)
    }
}

/// A file opened from a [`HostFs`].
///
/// The descriptor is released by [`File::close`]; every call after that
/// fails with [`FsError::Closed`].
#[derive(Debug)]
pub struct HostFile {
    name: String,
    file: RwLock<Option<fs::File>>,
}

impl HostFile {
    fn with_file<T>(&self, op: impl FnOnce(&fs::File) -> io::Result<T>) -> FsResult<T> {
        match self.file.read().as_ref() {
            Some(file) => op(file).map_err(host_err),
            None => Err(FsError::Closed),
        }
    }
}

impl File for HostFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.with_file(|file| file.read_at(buf, offset))
    }

    fn write(&self, data: &[u8]) -> FsResult<usize> {
        self.with_file(|mut file| file.write(data))
    }

    fn seek(&self, pos: SeekFrom) -> FsResult<u64> {
        self.with_file(|mut file| file.seek(pos))
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.with_file(|file| file.set_len(size))
    }

    fn close(&self) -> FsResult<()> {
        let file = self.file.write().take().ok_or(FsError::Closed)?;
        trace!(path = %self.name, "hostfs: closing");
        nix::unistd::close(file).map_err(|errno| host_err(errno.into()))
    }

    fn as_write_at(&self) -> Option<&dyn WriteAt> {
        Some(self)
    }
}

impl WriteAt for HostFile {
    fn write_at(&self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.with_file(|file| file.write_at(data, offset))
    }
}
