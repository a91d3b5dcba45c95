use crate::errors::AppError;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

const KEY_SEP: char = '\u{1f}';

/// A unique (possibly compound) index. Records missing any indexed field are not indexed.
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    pub fields: Vec<String>,
    keys: HashMap<String, DocumentId>,
}

impl UniqueIndex {
    #[must_use]
    pub fn new(fields: &[&str]) -> Self {
        Self { fields: fields.iter().map(|f| (*f).to_string()).collect(), keys: HashMap::new() }
    }

    fn values<'a>(&self, doc: &'a BsonDocument) -> Option<Vec<&'a Bson>> {
        self.fields
            .iter()
            .map(|f| doc.get(f).filter(|v| !matches!(v, Bson::Null)))
            .collect()
    }

    fn key_for(&self, doc: &BsonDocument) -> Option<String> {
        let vals = self.values(doc)?;
        Some(vals.iter().map(|v| key_part(v)).collect::<Vec<_>>().join(&KEY_SEP.to_string()))
    }

    /// Fails when another record already holds this record's key.
    pub fn check(&self, doc: &BsonDocument, id: &DocumentId) -> Result<(), AppError> {
        let Some(key) = self.key_for(doc) else {
            return Ok(());
        };
        match self.keys.get(&key) {
            Some(owner) if owner != id => {
                let value = self
                    .values(doc)
                    .unwrap_or_default()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(AppError::DuplicateKey { fields: self.fields.clone(), value })
            }
            _ => Ok(()),
        }
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: DocumentId) {
        if let Some(key) = self.key_for(doc) {
            self.keys.insert(key, id);
        }
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        if let Some(key) = self.key_for(doc)
            && self.keys.get(&key) == Some(id)
        {
            self.keys.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn key_part(v: &Bson) -> String {
    match v {
        Bson::String(s) => format!("s:{s}"),
        Bson::ObjectId(o) => format!("o:{}", o.to_hex()),
        Bson::Int32(i) => format!("n:{}", f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => format!("n:{}", *i as f64),
        Bson::Double(f) => format!("n:{f}"),
        other => format!("x:{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn compound_key_collides_only_on_all_fields() {
        let (tour, user) = (ObjectId::new(), ObjectId::new());
        let mut idx = UniqueIndex::new(&["tour", "user"]);
        let first = DocumentId::new();
        idx.insert(&doc! { "tour": tour, "user": user }, first);

        let dup = doc! { "tour": tour, "user": user };
        let err = idx.check(&dup, &DocumentId::new()).unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey { .. }));
        // the owner itself may be rewritten
        assert!(idx.check(&dup, &first).is_ok());
        assert!(idx.check(&doc! { "tour": tour, "user": ObjectId::new() }, &DocumentId::new()).is_ok());
    }

    #[test]
    fn missing_field_is_not_indexed() {
        let mut idx = UniqueIndex::new(&["email"]);
        idx.insert(&doc! { "name": "x" }, DocumentId::new());
        assert!(idx.is_empty());
    }

    #[test]
    fn numeric_types_share_keys() {
        let mut idx = UniqueIndex::new(&["n"]);
        idx.insert(&doc! { "n": 5_i32 }, DocumentId::new());
        assert!(idx.check(&doc! { "n": 5.0 }, &DocumentId::new()).is_err());
    }
}
