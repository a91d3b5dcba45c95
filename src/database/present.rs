use super::Database;
use crate::document::{Document, document_to_json};
use crate::errors::AppError;
use crate::model::{ModelDescriptor, Populate, PopulateKind};
use crate::query::{Filter, FindOptions, project};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use serde_json::Value;

/// Records nested deeper than this are presented without their own references.
const MAX_POPULATE_DEPTH: usize = 2;

impl Database {
    /// Client view of a record: hidden fields removed, virtuals computed,
    /// references populated (hidden targets drop out) and an `id` mirror added.
    pub fn present(&self, collection: &str, doc: &Document, extra: &[Populate]) -> Result<Value, AppError> {
        let model = self.model(collection)?;
        self.present_data(&model, &doc.data, extra, 0)
    }

    /// Presents a batch of records with the model's own population.
    pub fn present_all(&self, collection: &str, docs: &[Document]) -> Result<Vec<Value>, AppError> {
        let model = self.model(collection)?;
        docs.iter().map(|d| self.present_data(&model, &d.data, &[], 0)).collect()
    }

    fn present_data(
        &self,
        model: &ModelDescriptor,
        data: &BsonDocument,
        extra: &[Populate],
        depth: usize,
    ) -> Result<Value, AppError> {
        let mut out = data.clone();
        for v in &model.virtuals {
            if let Some(val) = (v.compute)(data) {
                out.insert(v.name, val);
            }
        }
        for f in model.schema.hidden_fields() {
            out.remove(f);
        }
        let Value::Object(mut map) = document_to_json(&out) else {
            return Err(AppError::Internal("record did not serialise to an object".into()));
        };

        if depth < MAX_POPULATE_DEPTH {
            for p in model.populate.iter().chain(extra) {
                if let Some(val) = self.populate(p, data, depth)? {
                    map.insert(p.path.to_string(), val);
                }
            }
        }
        if let Some(Bson::ObjectId(oid)) = data.get("_id") {
            map.insert("id".into(), Value::String(oid.to_hex()));
        }
        Ok(Value::Object(map))
    }

    fn populate(&self, p: &Populate, data: &BsonDocument, depth: usize) -> Result<Option<Value>, AppError> {
        let target = self.model(p.target)?;
        let nested = |doc: &Document| -> Result<Value, AppError> {
            let body = p.select.as_ref().map_or_else(|| doc.data.clone(), |s| project(&doc.data, s));
            self.present_data(&target, &body, &[], depth + 1)
        };
        let value = match p.kind {
            PopulateKind::One => {
                let Some(id) = ref_id(data.get(p.path)) else {
                    return Ok(None);
                };
                match self.find_by_id(p.target, &id)? {
                    Some(doc) => nested(&doc)?,
                    None => Value::Null,
                }
            }
            PopulateKind::Many => {
                let Some(Bson::Array(ids)) = data.get(p.path) else {
                    return Ok(None);
                };
                let mut items = Vec::with_capacity(ids.len());
                for id in ids.iter().filter_map(|b| ref_id(Some(b))) {
                    if let Some(doc) = self.find_by_id(p.target, &id)? {
                        items.push(nested(&doc)?);
                    }
                }
                Value::Array(items)
            }
            PopulateKind::Virtual { foreign_field } => {
                let Some(Bson::ObjectId(own)) = data.get("_id") else {
                    return Ok(None);
                };
                let docs = self.find(p.target, Filter::eq(foreign_field, *own), &FindOptions::default())?;
                Value::Array(docs.iter().map(&nested).collect::<Result<_, _>>()?)
            }
        };
        Ok(Some(value))
    }
}

fn ref_id(v: Option<&Bson>) -> Option<DocumentId> {
    match v? {
        Bson::ObjectId(oid) => Some(DocumentId(*oid)),
        Bson::String(s) => DocumentId::parse(s).ok(),
        _ => None,
    }
}
