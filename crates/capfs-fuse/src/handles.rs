//! Thread-safe table of open file and directory handles.
//!
//! Handle ids are what the kernel passes back as `fh`. They start at 1 and
//! are never 0, which is reserved for "no handle".

use crate::handle::{DirHandle, Handle};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An entry in the handle table.
#[derive(Debug, Clone)]
pub enum OpenHandle {
    /// An open file, shared with in-flight worker jobs.
    File(Arc<Handle>),
    /// An open directory.
    Dir(DirHandle),
}

impl OpenHandle {
    pub fn is_file(&self) -> bool {
        matches!(self, OpenHandle::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, OpenHandle::Dir(_))
    }
}

/// Thread-safe handle table with auto-incrementing ids.
#[derive(Debug)]
pub struct HandleTable {
    handles: DashMap<u64, OpenHandle>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a handle and returns its new id.
    pub fn insert(&self, handle: OpenHandle) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.handles.entry(id) {
                slot.insert(handle);
                return id;
            }
        }
    }

    /// Inserts an open file.
    pub fn insert_file(&self, handle: Handle) -> u64 {
        self.insert(OpenHandle::File(Arc::new(handle)))
    }

    /// Inserts an open directory.
    pub fn insert_dir(&self, handle: DirHandle) -> u64 {
        self.insert(OpenHandle::Dir(handle))
    }

    /// A clone of the handle entry.
    pub fn get(&self, id: u64) -> Option<OpenHandle> {
        self.handles.get(&id).map(|h| h.value().clone())
    }

    /// The open file with this id, if it is one.
    pub fn file(&self, id: u64) -> Option<Arc<Handle>> {
        match self.get(id)? {
            OpenHandle::File(handle) => Some(handle),
            OpenHandle::Dir(_) => None,
        }
    }

    /// The open directory with this id, if it is one.
    pub fn dir(&self, id: u64) -> Option<DirHandle> {
        match self.get(id)? {
            OpenHandle::Dir(handle) => Some(handle),
            OpenHandle::File(_) => None,
        }
    }

    /// Removes and returns a handle.
    pub fn remove(&self, id: u64) -> Option<OpenHandle> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Removes every handle, returning the open files so they can be released.
    pub fn drain_files(&self) -> Vec<Arc<Handle>> {
        let ids: Vec<u64> = self.handles.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter_map(|id| match self.remove(id) {
                Some(OpenHandle::File(handle)) => Some(handle),
                _ => None,
            })
            .collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
