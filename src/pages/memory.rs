//! Which pages have rendered at least once
//!
//! Pages are unmounted as they scroll out of the window and mounted again
//! when they come back. A page that rendered before should come back without
//! a loading placeholder, so this record outlives any single mount. It is
//! keyed by document; switching documents drops the previous document's
//! entries.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use log::debug;

#[derive(Debug, Default)]
pub struct PageLoadMemory {
    active_document: Option<String>,
    loaded: HashSet<(String, usize)>,
}

impl PageLoadMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_ever_loaded(&mut self, document_id: &str, page: usize) -> bool {
        self.observe_document(document_id);
        self.loaded.contains(&(document_id.to_string(), page))
    }

    pub fn mark_as_loaded(&mut self, document_id: &str, page: usize) {
        self.observe_document(document_id);
        self.loaded.insert((document_id.to_string(), page));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    fn observe_document(&mut self, document_id: &str) {
        if self.active_document.as_deref() == Some(document_id) {
            return;
        }
        if let Some(previous) = self.active_document.take() {
            let before = self.loaded.len();
            self.loaded.retain(|(doc, _)| *doc != previous);
            debug!(
                "Document changed from {previous} to {document_id}, forgot {} loaded pages",
                before - self.loaded.len()
            );
        }
        self.active_document = Some(document_id.to_string());
    }
}

/// Handle to a page memory that may be shared between viewers
#[derive(Clone, Debug, Default)]
pub struct SharedPageMemory(Arc<Mutex<PageLoadMemory>>);

impl SharedPageMemory {
    /// A fresh memory not shared with anything else
    #[must_use]
    pub fn isolated() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, PageLoadMemory> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn has_ever_loaded(&self, document_id: &str, page: usize) -> bool {
        self.lock().has_ever_loaded(document_id, page)
    }

    pub fn mark_as_loaded(&self, document_id: &str, page: usize) {
        self.lock().mark_as_loaded(document_id, page);
    }
}

static GLOBAL: LazyLock<SharedPageMemory> = LazyLock::new(SharedPageMemory::default);

/// The process-wide page memory
#[must_use]
pub fn global() -> SharedPageMemory {
    GLOBAL.clone()
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn survives_remount() {
        let memory = SharedPageMemory::isolated();
        assert!(!memory.has_ever_loaded("doc1", 4));
        memory.mark_as_loaded("doc1", 4);

        // A second handle stands in for a remounted page
        let remounted = memory.clone();
        assert!(remounted.has_ever_loaded("doc1", 4));
        assert!(!remounted.has_ever_loaded("doc1", 5));
    }

    #[test]
    fn switching_documents_forgets_the_previous_one() {
        let mut memory = PageLoadMemory::new();
        memory.mark_as_loaded("doc1", 4);
        memory.mark_as_loaded("doc1", 5);

        assert!(!memory.has_ever_loaded("doc2", 4));
        assert!(memory.is_empty());
        assert!(!memory.has_ever_loaded("doc1", 4));
    }

    #[test]
    fn ids_sharing_a_prefix_are_distinct() {
        let mut memory = PageLoadMemory::new();
        memory.mark_as_loaded("doc-1", 2);
        memory.mark_as_loaded("doc", 12);
        assert_eq!(memory.len(), 1);
        assert!(memory.has_ever_loaded("doc", 12));
        assert!(!memory.has_ever_loaded("doc", 2));
    }

    #[test]
    fn marking_is_idempotent() {
        let mut memory = PageLoadMemory::new();
        memory.mark_as_loaded("doc", 1);
        memory.mark_as_loaded("doc", 1);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    #[serial]
    fn global_instance_is_shared() {
        let a = global();
        let b = global();
        a.mark_as_loaded("global-test-doc", 3);
        assert!(b.has_ever_loaded("global-test-doc", 3));
    }
}
