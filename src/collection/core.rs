use super::index::UniqueIndex;
use crate::document::Document;
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Records plus their unique indexes, guarded together so a uniqueness check
/// and the write it protects happen under one lock.
#[derive(Default)]
pub(crate) struct CollectionState {
    /// Ordered by id, which orders by creation.
    pub(crate) docs: BTreeMap<DocumentId, Document>,
    pub(crate) unique: Vec<UniqueIndex>,
}

pub struct Collection {
    pub name: Arc<RwLock<String>>,
    pub(crate) state: RwLock<CollectionState>,
}

impl Collection {
    pub fn new(name: String) -> Self {
        Self { name: Arc::new(RwLock::new(name)), state: RwLock::new(CollectionState::default()) }
    }

    /// Returns the collection's name as a String (cloned), hiding the `RwLock`.
    pub fn name_str(&self) -> String {
        self.name.read().clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().docs.is_empty()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name_str()).field("len", &self.len()).finish()
    }
}
