use super::core::{Collection, CollectionState};
use super::index::UniqueIndex;
use crate::document::Document;
use crate::errors::AppError;
use crate::telemetry;
use crate::types::DocumentId;
use bson::Document as BsonDocument;

/// Outcome of [`Collection::replace_if_current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap {
    Replaced,
    /// Another write landed since the caller read the record.
    Stale,
    Missing,
}

/// Swaps `old` for `new` (same id), keeping every unique index in step.
fn commit(st: &mut CollectionState, old: &Document, new: Document) -> Result<(), AppError> {
    for idx in &st.unique {
        idx.check(&new.data, &old.id)?;
    }
    for idx in &mut st.unique {
        idx.remove(&old.data, &old.id);
        idx.insert(&new.data, old.id);
    }
    st.docs.insert(old.id, new);
    Ok(())
}

impl Collection {
    pub fn insert_document(&self, document: Document) -> Result<DocumentId, AppError> {
        let doc_id = document.id;
        {
            let mut st = self.state.write();
            for idx in &st.unique {
                idx.check(&document.data, &doc_id)?;
            }
            for idx in &mut st.unique {
                idx.insert(&document.data, doc_id);
            }
            st.docs.insert(doc_id, document);
        }
        telemetry::log_audit("insert", &self.name_str(), &doc_id.to_hex());
        Ok(doc_id)
    }

    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.state.read().docs.get(id).cloned()
    }

    /// Replaces a record only while its stored body still equals `expected`.
    pub fn replace_if_current(
        &self,
        id: &DocumentId,
        expected: &BsonDocument,
        new_document: Document,
    ) -> Result<Swap, AppError> {
        {
            let mut st = self.state.write();
            let Some(old) = st.docs.get(id).cloned() else {
                return Ok(Swap::Missing);
            };
            if old.data != *expected {
                return Ok(Swap::Stale);
            }
            let mut replacement = old.clone();
            replacement.update(new_document.data);
            commit(&mut st, &old, replacement)?;
        }
        telemetry::log_audit("update", &self.name_str(), &id.to_hex());
        Ok(Swap::Replaced)
    }

    /// Edits a record in place under the write lock. `edit` reports whether it
    /// changed anything; an untouched record is not rewritten. Returns
    /// `Ok(false)` when the id is unknown.
    pub fn modify<F>(&self, id: &DocumentId, edit: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut BsonDocument) -> bool,
    {
        {
            let mut st = self.state.write();
            let Some(old) = st.docs.get(id).cloned() else {
                return Ok(false);
            };
            let mut data = old.data.clone();
            if !edit(&mut data) {
                return Ok(true);
            }
            let mut replacement = old.clone();
            replacement.update(data);
            commit(&mut st, &old, replacement)?;
        }
        telemetry::log_audit("update", &self.name_str(), &id.to_hex());
        Ok(true)
    }

    /// Removes a record, returning what was removed.
    pub fn delete_document(&self, id: &DocumentId) -> Option<Document> {
        let removed = {
            let mut st = self.state.write();
            let removed = st.docs.remove(id)?;
            for idx in &mut st.unique {
                idx.remove(&removed.data, id);
            }
            removed
        };
        telemetry::log_audit("delete", &self.name_str(), &id.to_hex());
        Some(removed)
    }

    /// All records in creation order.
    pub fn get_all_documents(&self) -> Vec<Document> {
        self.state.read().docs.values().cloned().collect()
    }

    /// Declares a unique index, building it from the records already present.
    pub fn create_unique_index(&self, fields: &[&str]) -> Result<(), AppError> {
        let mut st = self.state.write();
        if st.unique.iter().any(|i| i.fields.iter().map(String::as_str).eq(fields.iter().copied())) {
            return Ok(());
        }
        let mut idx = UniqueIndex::new(fields);
        for (id, doc) in &st.docs {
            idx.check(&doc.data, id)?;
            idx.insert(&doc.data, *id);
        }
        st.unique.push(idx);
        Ok(())
    }

    /// Drops every record, keeping index declarations.
    pub fn clear(&self) {
        let mut st = self.state.write();
        st.docs.clear();
        let fields: Vec<Vec<String>> = st.unique.iter().map(|i| i.fields.clone()).collect();
        st.unique = fields
            .iter()
            .map(|f| UniqueIndex::new(&f.iter().map(String::as_str).collect::<Vec<_>>()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn unique_violation_leaves_collection_untouched() {
        let col = Collection::new("users".into());
        col.create_unique_index(&["email"]).unwrap();
        col.insert_document(Document::new(doc! { "email": "a@b.io" })).unwrap();
        let err = col.insert_document(Document::new(doc! { "email": "a@b.io" })).unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey { .. }));
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn modify_moves_index_key() {
        let col = Collection::new("users".into());
        col.create_unique_index(&["email"]).unwrap();
        let id = col.insert_document(Document::new(doc! { "email": "a@b.io" })).unwrap();
        assert!(col.modify(&id, |d| d.insert("email", "c@d.io").is_some()).unwrap());
        // old key is free again
        col.insert_document(Document::new(doc! { "email": "a@b.io" })).unwrap();
        let taken = col.modify(&id, |d| d.insert("email", "a@b.io").is_some());
        assert!(matches!(taken, Err(AppError::DuplicateKey { .. })));
        assert!(!col.modify(&DocumentId::new(), |_| true).unwrap());
    }

    #[test]
    fn replace_refuses_stale_reads() {
        let col = Collection::new("tours".into());
        let id = col.insert_document(Document::new(doc! { "name": "x", "n": 0 })).unwrap();
        let read = col.find_document(&id).unwrap();
        col.modify(&id, |d| d.insert("n", 1).is_some()).unwrap();

        let mut patched = read.data.clone();
        patched.insert("name", "y");
        let swap = col.replace_if_current(&id, &read.data, Document::with_id(id, patched)).unwrap();
        assert_eq!(swap, Swap::Stale);
        assert_eq!(col.find_document(&id).unwrap().data.get_i32("n").unwrap(), 1);

        let fresh = col.find_document(&id).unwrap();
        let mut patched = fresh.data.clone();
        patched.insert("name", "y");
        assert_eq!(col.replace_if_current(&id, &fresh.data, Document::with_id(id, patched)).unwrap(), Swap::Replaced);
        let stored = col.find_document(&id).unwrap();
        assert_eq!((stored.data.get_str("name").unwrap(), stored.data.get_i32("n").unwrap()), ("y", 1));
        col.delete_document(&id);
        assert_eq!(col.replace_if_current(&id, &stored.data, stored.clone()).unwrap(), Swap::Missing);
    }

    #[test]
    fn delete_returns_removed_record() {
        let col = Collection::new("tours".into());
        let id = col.insert_document(Document::new(doc! { "name": "x" })).unwrap();
        let removed = col.delete_document(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(col.delete_document(&id).is_none());
        assert!(col.is_empty());
    }
}
