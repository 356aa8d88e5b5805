//! Call hook invoked before every operation reaches the backing filesystem.
//!
//! A hook sees a [`Call`] describing the operation and its parameters. An
//! `Err` aborts the operation: it is translated like any backing error and
//! the backing filesystem is never touched.

use crate::node::SetattrRequest;
use capfs_core::{FsError, OpenFlags};
use std::fmt;
use std::sync::Arc;

/// An operation about to be performed, with its parameters.
///
/// `path` is always the path of the node (or open file) the operation is
/// addressed to; child names are carried separately.
#[derive(Debug, Clone, Copy)]
pub enum Call<'a> {
    Attr {
        path: &'a str,
    },
    Lookup {
        path: &'a str,
        name: &'a str,
    },
    Mkdir {
        path: &'a str,
        name: &'a str,
        mode: u32,
    },
    Remove {
        path: &'a str,
        name: &'a str,
    },
    Symlink {
        path: &'a str,
        target: &'a str,
        name: &'a str,
    },
    Readlink {
        path: &'a str,
    },
    Rename {
        path: &'a str,
        old_name: &'a str,
        new_dir: &'a str,
        new_name: &'a str,
    },
    Setattr {
        path: &'a str,
        request: &'a SetattrRequest,
    },
    Create {
        path: &'a str,
        name: &'a str,
        flags: OpenFlags,
        mode: u32,
    },
    Open {
        path: &'a str,
        flags: OpenFlags,
        dir: bool,
    },
    Read {
        path: &'a str,
        offset: u64,
        size: usize,
    },
    Write {
        path: &'a str,
        offset: u64,
        len: usize,
    },
    Release {
        path: &'a str,
    },
    ReadDir {
        path: &'a str,
    },
}

impl Call<'_> {
    /// Short operation name, for logging and filtering.
    pub fn op(&self) -> &'static str {
        match self {
            Call::Attr { .. } => "attr",
            Call::Lookup { .. } => "lookup",
            Call::Mkdir { .. } => "mkdir",
            Call::Remove { .. } => "remove",
            Call::Symlink { .. } => "symlink",
            Call::Readlink { .. } => "readlink",
            Call::Rename { .. } => "rename",
            Call::Setattr { .. } => "setattr",
            Call::Create { .. } => "create",
            Call::Open { .. } => "open",
            Call::Read { .. } => "read",
            Call::Write { .. } => "write",
            Call::Release { .. } => "release",
            Call::ReadDir { .. } => "readdir",
        }
    }

    /// The path the call is addressed to.
    pub fn path(&self) -> &str {
        match self {
            Call::Attr { path }
            | Call::Lookup { path, .. }
            | Call::Mkdir { path, .. }
            | Call::Remove { path, .. }
            | Call::Symlink { path, .. }
            | Call::Readlink { path }
            | Call::Rename { path, .. }
            | Call::Setattr { path, .. }
            | Call::Create { path, .. }
            | Call::Open { path, .. }
            | Call::Read { path, .. }
            | Call::Write { path, .. }
            | Call::Release { path }
            | Call::ReadDir { path } => path,
        }
    }

    /// Returns true for calls that can modify the backing filesystem.
    pub fn is_mutation(&self) -> bool {
        match self {
            Call::Mkdir { .. }
            | Call::Remove { .. }
            | Call::Symlink { .. }
            | Call::Rename { .. }
            | Call::Setattr { .. }
            | Call::Create { .. }
            | Call::Write { .. } => true,
            Call::Open { flags, .. } => flags.writable() || flags.create() || flags.truncate(),
            _ => false,
        }
    }
}

impl fmt::Display for Call<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.op(), self.path())
    }
}

/// The hook signature.
pub type CallHook = Arc<dyn Fn(&Call<'_>) -> Result<(), FsError> + Send + Sync>;

/// A hook that rejects every mutating call with `EROFS`.
pub fn read_only_hook() -> CallHook {
    Arc::new(|call: &Call<'_>| {
        if call.is_mutation() {
            Err(FsError::Errno(libc::EROFS))
        } else {
            Ok(())
        }
    })
}

/// A hook that logs every call at info level, then defers to `inner`.
pub fn audit_hook(inner: Option<CallHook>) -> CallHook {
    Arc::new(move |call: &Call<'_>| {
        let result = inner.as_ref().map_or(Ok(()), |hook| hook(call));
        match &result {
            Ok(()) => tracing::info!(op = call.op(), path = call.path(), "call"),
            Err(e) => tracing::info!(op = call.op(), path = call.path(), error = %e, "call vetoed"),
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_and_path() {
        let call = Call::Rename {
            path: "a",
            old_name: "x",
            new_dir: "b",
            new_name: "y",
        };
        assert_eq!(call.op(), "rename");
        assert_eq!(call.path(), "a");
        assert_eq!(call.to_string(), "rename \"a\"");
    }

    #[test]
    fn test_is_mutation() {
        assert!(!Call::Attr { path: "" }.is_mutation());
        assert!(!Call::Read { path: "f", offset: 0, size: 1 }.is_mutation());
        assert!(Call::Write { path: "f", offset: 0, len: 1 }.is_mutation());
        assert!(
            !Call::Open {
                path: "f",
                flags: OpenFlags::READ,
                dir: false
            }
            .is_mutation()
        );
        assert!(
            Call::Open {
                path: "f",
                flags: OpenFlags::READ_WRITE,
                dir: false
            }
            .is_mutation()
        );
    }

    #[test]
    fn test_read_only_hook() {
        let hook = read_only_hook();
        assert!(hook(&Call::Readlink { path: "l" }).is_ok());
        let err = hook(&Call::Remove { path: "", name: "f" }).unwrap_err();
        assert!(matches!(err, FsError::Errno(libc::EROFS)));
    }

    #[test]
    fn test_audit_hook_defers_to_inner() {
        let hook = audit_hook(Some(read_only_hook()));
        assert!(hook(&Call::Attr { path: "" }).is_ok());
        assert!(hook(&Call::Mkdir { path: "", name: "d", mode: 0o755 }).is_err());

        let open = audit_hook(None);
        assert!(open(&Call::Mkdir { path: "", name: "d", mode: 0o755 }).is_ok());
    }
}
