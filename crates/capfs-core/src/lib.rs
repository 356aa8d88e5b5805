//! Capability-based abstract filesystem API.
//!
//! A backing filesystem implements the required [`Basic`] contract (stat,
//! open, remove, rename) and may additionally offer optional capabilities:
//!
//! - [`Dir`] - recursive directory creation and directory listing
//! - [`Symlink`] - symbolic link creation and resolution
//! - [`Change`] - mode, ownership and timestamp changes
//!
//! Optional capabilities are probed at call time through
//! [`Basic::as_dir`], [`Basic::as_symlink`] and [`Basic::as_change`]. A
//! backend that lacks one simply returns `None`; callers degrade the single
//! affected operation instead of failing the whole filesystem.
//!
//! # Backends
//!
//! - [`MemFs`] - in-memory tree with every capability
//! - [`HostFs`] - a host directory used as the filesystem root
//! - [`Restricted`] - wraps another backend and hides chosen capabilities
//!
//! # Example
//!
//! ```
//! use capfs_core::{Basic, MemFs, OpenFlags};
//!
//! let fs = MemFs::new();
//! let file = fs.open_file("hello.txt", OpenFlags::CREATE_WRITE, 0o644).unwrap();
//! file.write(b"hello").unwrap();
//! file.close().unwrap();
//!
//! assert_eq!(fs.stat("hello.txt").unwrap().size, 5);
//! assert!(fs.as_dir().is_some());
//! ```

pub mod capability;
pub mod error;
pub mod hostfs;
pub mod memfs;
pub mod metadata;
pub mod path;
pub mod restricted;

pub use capability::{Basic, Capabilities, Capability, Change, Dir, File, Symlink, WriteAt};
pub use error::{FsError, FsResult};
pub use hostfs::HostFs;
pub use memfs::{MAX_FILE_SIZE, MemFs};
pub use metadata::{DirEntry, FileKind, Metadata, OpenFlags};
pub use restricted::Restricted;
