//! Base-directory bookkeeping for reference nodes
//!
//! The serialized stylesheet has no reliable place to remember which
//! directory a reference was written relative to, so it is tracked beside
//! the tree. Entries are keyed by node handle rather than by href, so two
//! references sharing the same href never collide.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use xot::Node;

/// Maps reference nodes to the directory their href is relative to
#[derive(Debug, Clone, Default)]
pub struct BaseUriTable {
    entries: HashMap<Node, PathBuf>,
}

impl BaseUriTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: Node, base_dir: impl Into<PathBuf>) {
        self.entries.insert(node, base_dir.into());
    }

    pub fn get(&self, node: Node) -> Option<&Path> {
        self.entries.get(&node).map(PathBuf::as_path)
    }

    pub fn has(&self, node: Node) -> bool {
        self.entries.contains_key(&node)
    }

    /// Drop the entry of a reference that was consolidated or rebased
    pub fn remove(&mut self, node: Node) -> Option<PathBuf> {
        self.entries.remove(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
