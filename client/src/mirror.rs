//! Local mirror of the most recent world snapshot pushed by the server

use ctf_shared::WorldSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Single-writer, multi-reader holder of the latest snapshot.
///
/// Snapshots are replaced wholesale by swapping the `Arc`, so a reader either
/// sees the complete old snapshot or the complete new one.
#[derive(Debug, Default)]
pub struct StateMirror {
    current: RwLock<Option<Arc<WorldSnapshot>>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, snapshot: WorldSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot);
    }

    /// Local copy of the current reference; holds no lock after returning.
    pub fn snapshot(&self) -> Option<Arc<WorldSnapshot>> {
        self.current.read().clone()
    }

    pub fn clear(&self) {
        self.current.write().take();
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}
