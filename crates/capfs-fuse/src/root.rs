//! The shared state of one mount.

use crate::error::{Errno, FuseResult, translate};
use crate::hook::{Call, CallHook};
use crate::node::Node;
use capfs_core::{Basic, Capabilities, path};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct RootInner {
    fs: Arc<dyn Basic>,
    hook: Option<CallHook>,
}

/// Owns the backing filesystem and the call hook.
///
/// Cloning is cheap; every [`Node`], [`Handle`](crate::Handle) and
/// [`DirHandle`](crate::DirHandle) carries a clone.
#[derive(Clone)]
pub struct Root {
    inner: Arc<RootInner>,
}

impl Root {
    pub fn new(fs: Arc<dyn Basic>) -> Self {
        Self {
            inner: Arc::new(RootInner { fs, hook: None }),
        }
    }

    /// Creates a root whose hook runs before every operation.
    pub fn with_hook(fs: Arc<dyn Basic>, hook: CallHook) -> Self {
        Self {
            inner: Arc::new(RootInner {
                fs,
                hook: Some(hook),
            }),
        }
    }

    /// The node for the root of the tree (empty path).
    pub fn node(&self) -> Node {
        Node::new(self.clone(), String::new())
    }

    /// A node for an already known path.
    ///
    /// The path must be normalized; this never consults the hook or the
    /// backing filesystem.
    pub fn node_at(&self, path: &str) -> FuseResult<Node> {
        if !path::is_normalized(path) {
            return Err(Errno::EINVAL);
        }
        Ok(Node::new(self.clone(), path.to_string()))
    }

    /// The backing filesystem.
    pub fn fs(&self) -> &dyn Basic {
        self.inner.fs.as_ref()
    }

    /// The optional capabilities the backing filesystem offers.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::of(self.fs())
    }

    pub fn has_hook(&self) -> bool {
        self.inner.hook.is_some()
    }

    /// Runs the hook, if any, translating a veto.
    pub(crate) fn check(&self, call: &Call<'_>) -> FuseResult<()> {
        let Some(hook) = &self.inner.hook else {
            return Ok(());
        };
        translate(hook(call)).inspect_err(|errno| {
            debug!(op = call.op(), path = call.path(), errno = errno.code(), "call rejected by hook");
        })
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("capabilities", &self.capabilities())
            .field("hook", &self.has_hook())
            .finish()
    }
}
