mod present;
mod write;

pub use write::WriteMode;

use crate::aggregate::{Stage, run_pipeline};
use crate::collection::Collection;
use crate::document::Document;
use crate::engine::Engine;
use crate::errors::AppError;
use crate::model::{self, ModelDescriptor};
use crate::query::{self, Filter, FindOptions};
use crate::telemetry;
use crate::types::DocumentId;
use crate::visibility;
use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// The store plus the registered models. Every read goes through the model's
/// visibility scope; every client write goes through its schema and stages.
#[derive(Debug)]
pub struct Database {
    engine: Arc<Engine>,
    models: HashMap<&'static str, Arc<ModelDescriptor>>,
}

impl Database {
    /// Creates an in-memory database with the built-in models.
    pub fn in_memory() -> Result<Self, AppError> {
        Self::with_engine(Engine::new())
    }

    /// Opens a database snapshotted under `data_dir`, loading what is there.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, AppError> {
        let db = Self::with_engine(Engine::with_data_dir(data_dir)?)?;
        // indexes first, so a snapshot with duplicates loses the later copies
        db.engine.load_snapshot()?;
        Ok(db)
    }

    fn with_engine(engine: Engine) -> Result<Self, AppError> {
        let mut db = Self { engine: Arc::new(engine), models: HashMap::new() };
        for m in model::builtin() {
            db.register(m)?;
        }
        Ok(db)
    }

    /// Adds a model, creating its collection and unique indexes.
    pub fn register(&mut self, model: ModelDescriptor) -> Result<(), AppError> {
        let col = self.engine.create_collection(model.collection);
        for fields in model.schema.all_unique_indexes() {
            col.create_unique_index(&fields)?;
        }
        self.models.insert(model.collection, Arc::new(model));
        Ok(())
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn model(&self, collection: &str) -> Result<Arc<ModelDescriptor>, AppError> {
        self.models
            .get(collection)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("no model registered for {collection}")))
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        self.engine.create_collection(name)
    }

    /// Visible records matching `filter`, with sort, pagination and projection.
    pub fn find(&self, collection: &str, filter: Filter, opts: &FindOptions) -> Result<Vec<Document>, AppError> {
        let model = self.model(collection)?;
        let scoped = visibility::scope(&model, filter);
        Ok(query::find_docs(&self.collection(collection), &scoped, opts))
    }

    /// The record with `id`, unless it is hidden.
    pub fn find_by_id(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, AppError> {
        let model = self.model(collection)?;
        let pred = visibility::predicate(&model);
        Ok(self.collection(collection).find_document(id).filter(|d| query::eval_filter(&d.data, &pred)))
    }

    pub fn find_one(&self, collection: &str, filter: Filter) -> Result<Option<Document>, AppError> {
        let model = self.model(collection)?;
        Ok(query::find_one(&self.collection(collection), &visibility::scope(&model, filter)))
    }

    pub fn count(&self, collection: &str, filter: Filter) -> Result<usize, AppError> {
        let model = self.model(collection)?;
        Ok(query::count_docs(&self.collection(collection), &visibility::scope(&model, filter)))
    }

    /// Runs a pipeline over the collection with the visibility match in front.
    pub fn aggregate(&self, collection: &str, stages: Vec<Stage>) -> Result<Vec<BsonDocument>, AppError> {
        let started = std::time::Instant::now();
        let model = self.model(collection)?;
        let stages = visibility::scope_pipeline(&model, stages);
        let docs = self.collection(collection).get_all_documents().into_iter().map(|d| d.data).collect();
        let out = run_pipeline(docs, &stages)?;
        telemetry::log_query(collection, "aggregate", started, out.len());
        Ok(out)
    }

    /// Writes fields straight onto a record: no casting, validation, stages or
    /// visibility. A `Null` value removes the field. Only the named fields are
    /// touched, under the collection lock, so a concurrent update of other
    /// fields survives. Returns false when the id is unknown.
    pub fn set_fields(&self, collection: &str, id: &DocumentId, fields: BsonDocument) -> Result<bool, AppError> {
        self.collection(collection).modify(id, |doc| {
            let mut changed = false;
            for (k, v) in fields {
                if v == Bson::Null {
                    changed |= doc.remove(&k).is_some();
                } else if doc.get(&k) != Some(&v) {
                    doc.insert(k, v);
                    changed = true;
                }
            }
            changed
        })
    }

    /// Snapshots every collection when a data dir is configured.
    pub fn save_snapshot(&self) -> Result<u64, AppError> {
        self.engine.save_snapshot()
    }
}
