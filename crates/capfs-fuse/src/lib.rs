//! FUSE adapter for capability-based filesystems.
//!
//! This crate mounts any [`capfs_core::Basic`] backend as a FUSE
//! filesystem. Requests are translated into calls on the backend; results
//! and errors are translated back into attributes and errno values.
//!
//! # Layers
//!
//! - [`Root`], [`Node`], [`Handle`], [`DirHandle`] - the path-addressed
//!   object model. Each operation runs the call hook, then the backend,
//!   then the error translator. Usable without a kernel.
//! - [`CapFs`] - the `fuser::Filesystem` that maps inodes and file handle
//!   ids onto that object model
//! - [`mount`] / [`spawn_mount`] - session setup
//!
//! Optional capabilities are probed per call: a backend without directory
//! support answers `mkdir` and `readdir` with `ENOSYS`, one without
//! metadata changes answers chmod/chown/utimes with `ENOTSUP`, and files
//! without positioned writes fall back to a locked seek and write.
//!
//! # Usage
//!
//! ```no_run
//! use capfs_core::MemFs;
//! use capfs_fuse::{CapFs, MountConfig, Root, mount};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let root = Root::new(Arc::new(MemFs::new()));
//! let fs = CapFs::new(root, MountConfig::default())?;
//! mount(fs, Path::new("/mnt/scratch"))?;
//! # Ok::<(), capfs_fuse::MountError>(())
//! ```

pub mod attr;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filesystem;
pub mod handle;
pub mod handles;
pub mod hook;
pub mod inode;
pub mod node;
pub mod root;

pub use attr::Attr;
pub use backend::{MountHandle, mount, spawn_mount, validate_mountpoint};
pub use config::MountConfig;
pub use dispatch::WorkerPool;
pub use error::{Errno, FuseResult, MountError, ToErrno, translate};
pub use filesystem::{CapFs, ListedEntry};
pub use handle::{DirHandle, Dirent, Handle};
pub use handles::{HandleTable, OpenHandle};
pub use hook::{Call, CallHook, audit_hook, read_only_hook};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
pub use node::{Node, Opened, SetTime, SetattrRequest};
pub use root::Root;
