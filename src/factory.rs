//! Generic handlers for any registered model: create, get one, get all,
//! update and delete. They return a status and a JSON envelope and never
//! authorise; route wiring decides who may call them.

use crate::Database;
use crate::database::WriteMode;
use crate::document::json_object_to_document;
use crate::errors::AppError;
use crate::model::Populate;
use crate::query::{Filter, QueryBuilder};
use crate::types::DocumentId;
use serde_json::{Value, json};
use std::sync::Arc;

/// Status plus optional JSON body; `None` means an empty response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Option<Value>,
}

impl Reply {
    /// `{status: "success", data: {data: <record>}}`
    #[must_use]
    pub fn data(status: u16, record: Value) -> Self {
        Self { status, body: Some(json!({ "status": "success", "data": { "data": record } })) }
    }

    #[must_use]
    pub fn list(records: Vec<Value>) -> Self {
        Self {
            status: 200,
            body: Some(json!({ "status": "success", "results": records.len(), "data": { "data": records } })),
        }
    }

    #[must_use]
    pub const fn no_content() -> Self {
        Self { status: 204, body: None }
    }
}

#[derive(Debug, Clone)]
pub struct Crud {
    db: Arc<Database>,
    collection: &'static str,
    populate: Vec<Populate>,
    max_limit: Option<usize>,
}

impl Crud {
    #[must_use]
    pub fn new(db: Arc<Database>, collection: &'static str) -> Self {
        Self { db, collection, populate: Vec::new(), max_limit: None }
    }

    /// Extra population applied by `get_one` only.
    #[must_use]
    pub fn with_populate(mut self, p: Populate) -> Self {
        self.populate.push(p);
        self
    }

    #[must_use]
    pub const fn max_limit(mut self, max: Option<usize>) -> Self {
        self.max_limit = max;
        self
    }

    #[must_use]
    pub const fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn create_one(&self, payload: &Value) -> Result<Reply, AppError> {
        let body = json_object_to_document(payload)?;
        let doc = self.db.create(self.collection, &body)?;
        Ok(Reply::data(201, self.db.present(self.collection, &doc, &[])?))
    }

    pub fn get_one(&self, id: &str) -> Result<Reply, AppError> {
        let id = DocumentId::parse(id)?;
        let model = self.db.model(self.collection)?;
        let doc = self.db.find_by_id(self.collection, &id)?.ok_or_else(|| AppError::not_found(model.name))?;
        Ok(Reply::data(200, self.db.present(self.collection, &doc, &self.populate)?))
    }

    /// Runs the query-string through the query builder, narrowed by `parent`
    /// (e.g. `tour = :tourId` on nested review routes).
    pub fn get_all(&self, params: Vec<(String, String)>, parent: Filter) -> Result<Reply, AppError> {
        let model = self.db.model(self.collection)?;
        let (filter, opts) = QueryBuilder::new(parent, params)
            .with_caster(&model.schema)
            .max_limit(self.max_limit)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .build()?;
        let docs = self.db.find(self.collection, filter, &opts)?;
        Ok(Reply::list(self.db.present_all(self.collection, &docs)?))
    }

    pub fn update_one(&self, id: &str, patch: &Value) -> Result<Reply, AppError> {
        let id = DocumentId::parse(id)?;
        let patch = json_object_to_document(patch)?;
        let doc = self.db.update(self.collection, &id, &patch, WriteMode::Partial)?;
        Ok(Reply::data(200, self.db.present(self.collection, &doc, &[])?))
    }

    pub fn delete_one(&self, id: &str) -> Result<Reply, AppError> {
        let id = DocumentId::parse(id)?;
        self.db.delete(self.collection, &id)?;
        Ok(Reply::no_content())
    }
}
