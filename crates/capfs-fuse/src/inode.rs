//! Inode management for the FUSE session.
//!
//! The kernel addresses entries by inode number; the translation layer
//! addresses them by path. This table maps between the two and tracks the
//! kernel's `nlookup` count so entries can be dropped on `forget`.

use capfs_core::path;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Path relative to the mount root.
    pub path: String,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    /// Creates a new inode entry with nlookup = 1.
    pub fn new(path: String) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Creates a new inode entry with nlookup = 0.
    /// Used for entries returned from `readdir()`, which must not count as
    /// lookups.
    pub fn new_no_lookup(path: String) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(0),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count by the given amount and returns the new value.
    /// Returns `None` if the count would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::AcqRel);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::Relaxed);
            None
        } else {
            Some(old - count)
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe bidirectional map between inodes and paths.
pub struct InodeTable {
    path_to_ino: DashMap<String, u64>,
    entries: DashMap<u64, InodeEntry>,
    next_ino: AtomicU64,
}

impl InodeTable {
    /// Creates a new inode table with the root directory pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_ino: DashMap::new(),
            entries: DashMap::new(),
            next_ino: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_ino.insert(String::new(), ROOT_INODE);
        table
            .entries
            .insert(ROOT_INODE, InodeEntry::new(String::new()));
        table
    }

    fn insert_with(&self, path: &str, make_entry: impl FnOnce() -> InodeEntry) -> u64 {
        *self
            .path_to_ino
            .entry(path.to_string())
            .or_insert_with(|| {
                let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
                self.entries.insert(ino, make_entry());
                ino
            })
    }

    /// Returns the inode for `path`, allocating one if needed, and counts
    /// one kernel lookup.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        if let Some(ino) = self.get_inode(path) {
            if let Some(entry) = self.entries.get(&ino) {
                entry.inc_nlookup();
                return ino;
            }
        }
        self.insert_with(path, || InodeEntry::new(path.to_string()))
    }

    /// Returns the inode for `path` without counting a lookup.
    ///
    /// Entries returned from `readdir()` must not affect the lookup count;
    /// only `lookup()`, `create()`, `mkdir()` and `symlink()` do.
    pub fn get_or_insert_no_lookup_inc(&self, path: &str) -> u64 {
        if let Some(ino) = self.get_inode(path) {
            return ino;
        }
        self.insert_with(path, || InodeEntry::new_no_lookup(path.to_string()))
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.entries.get(&ino)
    }

    /// The path currently mapped to `ino`.
    pub fn path(&self, ino: u64) -> Option<String> {
        self.entries.get(&ino).map(|e| e.path.clone())
    }

    /// Looks up an inode by path.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_ino.get(path).map(|r| *r)
    }

    /// Decrements the lookup count for an inode.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }

        if let Some(entry) = self.entries.get(&ino)
            && let Some(remaining) = entry.dec_nlookup(nlookup)
            && remaining == 0
        {
            drop(entry);
            return self.evict(ino);
        }
        false
    }

    fn evict(&self, ino: u64) -> bool {
        match self.entries.remove(&ino) {
            Some((_, entry)) => {
                // Only drop the path mapping if it still points at this inode
                self.path_to_ino.remove_if(&entry.path, |_, mapped| *mapped == ino);
                true
            }
            None => false,
        }
    }

    /// Drops the path mapping after the entry was removed.
    ///
    /// The inode itself stays until the kernel forgets it: it may still pass
    /// the number to later operations, which then fail with `ENOENT` at the
    /// backing filesystem.
    pub fn invalidate_path(&self, path: &str) {
        self.path_to_ino.remove(path);
    }

    /// Re-paths `from` and everything below it to `to` after a rename.
    pub fn rename_path(&self, from: &str, to: &str) {
        // Whatever was at the destination has been replaced
        let replaced: Vec<String> = self
            .path_to_ino
            .iter()
            .filter(|r| path::starts_with(r.key(), to))
            .map(|r| r.key().clone())
            .collect();
        for key in replaced {
            self.path_to_ino.remove(&key);
        }

        let moved: Vec<(String, u64)> = self
            .path_to_ino
            .iter()
            .filter(|r| path::starts_with(r.key(), from))
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        for (old_path, ino) in moved {
            let Some(new_path) = path::rebase(&old_path, from, to) else {
                continue;
            };
            self.path_to_ino.remove(&old_path);
            self.path_to_ino.insert(new_path.clone(), ino);
            if let Some(mut entry) = self.entries.get_mut(&ino) {
                entry.path = new_path;
            }
        }
    }

    /// Returns the number of inodes currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
