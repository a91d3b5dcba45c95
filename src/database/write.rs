//! The write path shared by every model.
//!
//! Create: cast, strip derived fields, defaults, validate, before-persist
//! stages, insert, after-persist stages. Update and delete resolve the record
//! through the visibility scope first and hand its prior state to the
//! after-persist stages in a `WriteContext`.
//!
//! An update only commits over the exact record it merged into. When another
//! write (a ratings recompute, say) lands in between, the merge is redone on
//! the fresh record.

use super::Database;
use crate::collection::Swap;
use crate::document::Document;
use crate::errors::AppError;
use crate::model::{ModelDescriptor, PersistCtx, WriteContext, WriteOp};
use crate::schema::Validate;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};

/// How an update is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Only the assigned paths (a patch from a client).
    #[default]
    Partial,
    /// The whole merged record, record rules included (a full save).
    Save,
    /// No validation (internal bookkeeping such as reset tokens).
    Unchecked,
}

/// Merge attempts before an update gives up on a record that keeps changing.
const MAX_UPDATE_ATTEMPTS: usize = 8;

fn strip_derived(model: &ModelDescriptor, doc: &mut BsonDocument) {
    for k in model.derived {
        doc.remove(*k);
    }
}

fn run_before(
    model: &ModelDescriptor,
    op: WriteOp,
    doc: &mut BsonDocument,
    changed: &[String],
    before: Option<&BsonDocument>,
) -> Result<(), AppError> {
    let mut ctx = PersistCtx { op, doc, changed, before };
    for stage in &model.before_persist {
        (stage.run)(&mut ctx).map_err(|e| {
            log::debug!("{} stage '{}' rejected {}: {e}", model.collection, stage.name, op.as_str());
            e
        })?;
    }
    Ok(())
}

impl Database {
    fn run_after(&self, model: &ModelDescriptor, ctx: &WriteContext) {
        for stage in &model.after_persist {
            if let Err(e) = (stage.run)(self, ctx) {
                log::error!(
                    "post-{} stage '{}' failed for {}/{}: {e}",
                    ctx.op.as_str(),
                    stage.name,
                    ctx.collection,
                    ctx.id
                );
            }
        }
    }

    /// Creates a record from a client payload.
    pub fn create(&self, collection: &str, payload: &BsonDocument) -> Result<Document, AppError> {
        let model = self.model(collection)?;
        let mut doc = model.schema.cast_input(payload)?;
        strip_derived(&model, &mut doc);
        model.schema.apply_defaults(&mut doc);
        model.schema.validate(&doc, Validate::Full)?;

        let changed: Vec<String> = doc.keys().cloned().collect();
        run_before(&model, WriteOp::Create, &mut doc, &changed, None)?;

        let record = Document::new(doc);
        let id = self.collection(collection).insert_document(record.clone())?;
        self.run_after(
            &model,
            &WriteContext {
                collection: model.collection,
                op: WriteOp::Create,
                id,
                before: None,
                after: Some(record.data.clone()),
            },
        );
        Ok(record)
    }

    /// Merges `patch` into a visible record. A `Null` value clears the field.
    pub fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: &BsonDocument,
        mode: WriteMode,
    ) -> Result<Document, AppError> {
        let model = self.model(collection)?;
        let mut cast = model.schema.cast_input(patch)?;
        strip_derived(&model, &mut cast);
        let changed: Vec<String> = cast.keys().cloned().collect();
        let col = self.collection(collection);

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self.find_by_id(collection, id)?.ok_or_else(|| AppError::not_found(model.name))?;
            let mut merged = current.data.clone();
            for (k, v) in &cast {
                if *v == Bson::Null {
                    merged.remove(k);
                } else {
                    merged.insert(k.clone(), v.clone());
                }
            }
            match mode {
                WriteMode::Partial => model.schema.validate(&merged, Validate::Paths(&changed))?,
                WriteMode::Save => model.schema.validate(&merged, Validate::Full)?,
                WriteMode::Unchecked => {}
            }
            run_before(&model, WriteOp::Update, &mut merged, &changed, Some(&current.data))?;

            let updated = Document::with_id(*id, merged);
            match col.replace_if_current(id, &current.data, updated.clone())? {
                Swap::Replaced => {
                    self.run_after(
                        &model,
                        &WriteContext {
                            collection: model.collection,
                            op: WriteOp::Update,
                            id: *id,
                            before: Some(current.data),
                            after: Some(updated.data.clone()),
                        },
                    );
                    return Ok(updated);
                }
                // deleted between the lookup and the write
                Swap::Missing => return Err(AppError::not_found(model.name)),
                Swap::Stale => log::debug!("{collection}/{id} changed during update (attempt {attempt}), merging again"),
            }
        }
        Err(AppError::Internal(format!("{collection}/{id} kept changing; update abandoned")))
    }

    /// Deletes a visible record. Nothing cascades.
    pub fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), AppError> {
        let model = self.model(collection)?;
        if self.find_by_id(collection, id)?.is_none() {
            return Err(AppError::not_found(model.name));
        }
        let removed = self
            .collection(collection)
            .delete_document(id)
            .ok_or_else(|| AppError::not_found(model.name))?;
        self.run_after(
            &model,
            &WriteContext {
                collection: model.collection,
                op: WriteOp::Delete,
                id: *id,
                before: Some(removed.data),
                after: None,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BeforePersist, tour, user};
    use bson::doc;
    use std::sync::OnceLock;

    fn tour_body() -> BsonDocument {
        doc! {
            "name": "The Sea Explorer", "duration": 7, "maxGroupSize": 15, "difficulty": "medium",
            "price": 497, "summary": "  Exploring the jaw-dropping US east coast  ",
            "imageCover": "tour-2-cover.jpg", "ratingsAverage": 1.1, "ratingsQuantity": 99,
        }
    }

    #[test]
    fn create_strips_derived_and_runs_stages() {
        let db = Database::in_memory().unwrap();
        let t = db.create(tour::COLLECTION, &tour_body()).unwrap();
        assert_eq!(t.data.get_f64("ratingsAverage").unwrap(), 4.5);
        assert_eq!(t.data.get_i32("ratingsQuantity").unwrap(), 0);
        assert_eq!(t.data.get_str("slug").unwrap(), "the-sea-explorer");
        assert_eq!(t.data.get_str("summary").unwrap(), "Exploring the jaw-dropping US east coast");
        assert_eq!(t.data.get_i32("__v").unwrap(), 0);
    }

    #[test]
    fn create_collects_every_violation() {
        let db = Database::in_memory().unwrap();
        let err = db.create(tour::COLLECTION, &doc! { "name": "Short", "difficulty": "extreme" }).unwrap_err();
        let AppError::Validation(msgs) = err else { panic!("expected validation error") };
        assert!(msgs.iter().any(|m| m.contains("more or equal than 10")));
        assert!(msgs.iter().any(|m| m.contains("Difficulty is either")));
        assert!(msgs.iter().any(|m| m == "A tour must have a price"));
    }

    #[test]
    fn partial_update_validates_touched_paths_only() {
        let db = Database::in_memory().unwrap();
        let t = db.create(tour::COLLECTION, &tour_body()).unwrap();
        let u = db.update(tour::COLLECTION, &t.id, &doc! { "name": "The Sea Explorer Two" }, WriteMode::Partial).unwrap();
        assert_eq!(u.data.get_str("slug").unwrap(), "the-sea-explorer-two");
        let err = db.update(tour::COLLECTION, &t.id, &doc! { "difficulty": "nope" }, WriteMode::Partial);
        assert!(matches!(err, Err(AppError::Validation(_))));
        let missing = db.update(tour::COLLECTION, &DocumentId::new(), &doc! {}, WriteMode::Partial);
        assert!(matches!(missing, Err(AppError::NotFound(m)) if m == "No tour found with that ID"));
    }

    #[test]
    fn user_password_hashed_and_confirm_dropped() {
        let db = Database::in_memory().unwrap();
        let u = db
            .create(
                user::COLLECTION,
                &doc! { "name": "Ann", "email": "ANN@Example.com ", "password": "pass1234", "passwordConfirm": "pass1234" },
            )
            .unwrap();
        assert_eq!(u.data.get_str("email").unwrap(), "ann@example.com");
        assert_ne!(u.data.get_str("password").unwrap(), "pass1234");
        assert!(!u.data.contains_key("passwordConfirm"));
        assert!(!u.data.contains_key("passwordChangedAt"));

        let dup = db.create(
            user::COLLECTION,
            &doc! { "name": "Ann2", "email": "ann@example.com", "password": "pass1234", "passwordConfirm": "pass1234" },
        );
        assert!(matches!(dup, Err(AppError::DuplicateKey { .. })));
    }

    #[test]
    fn delete_resolves_through_visibility() {
        let db = Database::in_memory().unwrap();
        let mut body = tour_body();
        body.insert("secretTour", true);
        let t = db.create(tour::COLLECTION, &body).unwrap();
        assert!(matches!(db.delete(tour::COLLECTION, &t.id), Err(AppError::NotFound(_))));
        assert_eq!(db.collection(tour::COLLECTION).len(), 1);
    }

    static RACING: OnceLock<Database> = OnceLock::new();

    // Stands in for a review write whose recompute commits while a tour
    // update is between its read and its write.
    fn recompute_lands_mid_update(ctx: &mut PersistCtx<'_>) -> Result<(), AppError> {
        if let (Some(db), Some(before)) = (RACING.get(), ctx.before) {
            let id = DocumentId(before.get_object_id("_id").map_err(|e| AppError::Internal(e.to_string()))?);
            db.set_fields(tour::COLLECTION, &id, doc! { "ratingsQuantity": 1, "ratingsAverage": 5.0 })?;
        }
        Ok(())
    }

    #[test]
    fn update_keeps_a_concurrent_recompute() {
        let mut db = Database::in_memory().unwrap();
        let mut tours = tour::descriptor();
        tours.before_persist.push(BeforePersist { name: "concurrent recompute", run: recompute_lands_mid_update });
        db.register(tours).unwrap();
        let db = RACING.get_or_init(|| db);

        let t = db.create(tour::COLLECTION, &tour_body()).unwrap();
        let u = db.update(tour::COLLECTION, &t.id, &doc! { "price": 500 }, WriteMode::Partial).unwrap();
        assert_eq!(u.data.get_i32("price").unwrap(), 500);

        let stored = db.collection(tour::COLLECTION).find_document(&t.id).unwrap();
        assert_eq!(stored.data.get_i32("price").unwrap(), 500);
        assert_eq!(stored.data.get_i32("ratingsQuantity").unwrap(), 1);
        assert_eq!(stored.data.get_f64("ratingsAverage").unwrap(), 5.0);
    }

    #[test]
    fn set_fields_leaves_other_fields_alone() {
        let db = Database::in_memory().unwrap();
        let t = db.create(tour::COLLECTION, &tour_body()).unwrap();
        db.update(tour::COLLECTION, &t.id, &doc! { "name": "The Sea Explorer Two" }, WriteMode::Partial).unwrap();
        // a recompute computed from an older read writes only its own fields
        db.set_fields(tour::COLLECTION, &t.id, doc! { "ratingsQuantity": 2, "ratingsAverage": 3.5 }).unwrap();
        let stored = db.collection(tour::COLLECTION).find_document(&t.id).unwrap();
        assert_eq!(stored.data.get_str("slug").unwrap(), "the-sea-explorer-two");
        assert_eq!(stored.data.get_i32("ratingsQuantity").unwrap(), 2);
    }
}
