// src/store/snapshot.rs

//! Immutable snapshot of a store subtree

use super::{BLOB_DIR, DirEntry, DirectoryLister};
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Every directory listing below a root, captured once
///
/// The snapshot is read-only after capture. Pointer files are not part of
/// it: [`DirectoryLister::read`] goes to the source lister.
pub struct StoreSnapshot<'a> {
    source: &'a dyn DirectoryLister,
    listings: HashMap<String, Vec<DirEntry>>,
}

impl<'a> StoreSnapshot<'a> {
    /// Walk `root` breadth-first and record every directory listing,
    /// except the blob tree directly under `root`
    pub fn capture(source: &'a dyn DirectoryLister, root: &str) -> Self {
        let root = root.trim_matches('/').to_string();
        let mut listings = HashMap::new();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(dir) = queue.pop_front() {
            let entries = source.list(&dir);
            let top = dir == root;
            for entry in entries
                .iter()
                .filter(|e| e.is_dir() && !(top && e.name == BLOB_DIR))
            {
                queue.push_back(format!("{}/{}", dir, entry.name));
            }
            listings.insert(dir, entries);
        }

        info!("Captured snapshot of {} ({} directories)", root, listings.len());
        Self { source, listings }
    }

    /// Number of directories captured
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

impl DirectoryLister for StoreSnapshot<'_> {
    fn list(&self, path: &str) -> Vec<DirEntry> {
        match self.listings.get(path.trim_matches('/')) {
            Some(entries) => entries.clone(),
            None => {
                debug!("{} not in snapshot", path);
                Vec::new()
            }
        }
    }

    fn read(&self, path: &str) -> Result<String> {
        self.source.read(path)
    }

    fn url(&self, path: &str) -> String {
        self.source.url(path)
    }
}
