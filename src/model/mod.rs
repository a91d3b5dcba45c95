//! Model descriptors: a schema plus the named write stages, read-time
//! population, visibility rule and output virtuals for one collection.

pub mod review;
pub mod tour;
pub mod user;

use crate::Database;
use crate::errors::AppError;
use crate::query::Projection;
use crate::schema::Schema;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// State handed from the write path to post-write stages: which record changed,
/// and its body before and after. `before` is captured prior to the write.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub collection: &'static str,
    pub op: WriteOp,
    pub id: DocumentId,
    pub before: Option<BsonDocument>,
    pub after: Option<BsonDocument>,
}

/// Mutable view given to pre-write stages.
pub struct PersistCtx<'a> {
    pub op: WriteOp,
    pub doc: &'a mut BsonDocument,
    /// Top-level paths assigned by this write.
    pub changed: &'a [String],
    pub before: Option<&'a BsonDocument>,
}

impl PersistCtx<'_> {
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.op == WriteOp::Create
    }

    #[must_use]
    pub fn is_modified(&self, path: &str) -> bool {
        self.changed.iter().any(|p| p == path)
    }
}

/// Runs after validation, before the record is stored. An error aborts the write.
#[derive(Clone, Copy)]
pub struct BeforePersist {
    pub name: &'static str,
    pub run: fn(&mut PersistCtx<'_>) -> Result<(), AppError>,
}

/// Runs after the write commits. Errors are logged, never surfaced.
#[derive(Clone, Copy)]
pub struct AfterPersist {
    pub name: &'static str,
    pub run: fn(&Database, &WriteContext) -> Result<(), AppError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateKind {
    /// `path` holds one id.
    One,
    /// `path` holds an array of ids.
    Many,
    /// Records in the target whose `foreign_field` points back at this record.
    Virtual { foreign_field: &'static str },
}

/// Replaces references with the referenced records on read.
#[derive(Debug, Clone)]
pub struct Populate {
    pub path: &'static str,
    pub target: &'static str,
    pub kind: PopulateKind,
    pub select: Option<Projection>,
}

/// Records where `field == value` are hidden from every read.
#[derive(Debug, Clone)]
pub struct HiddenWhen {
    pub field: &'static str,
    pub value: Bson,
}

/// Field computed on output and never stored.
#[derive(Clone, Copy)]
pub struct Virtual {
    pub name: &'static str,
    pub compute: fn(&BsonDocument) -> Option<Bson>,
}

pub struct ModelDescriptor {
    /// Singular, for messages ("No tour found with that ID").
    pub name: &'static str,
    pub collection: &'static str,
    pub schema: Schema,
    pub hidden_when: Option<HiddenWhen>,
    /// Maintained by the service; stripped from client payloads.
    pub derived: &'static [&'static str],
    pub before_persist: Vec<BeforePersist>,
    pub after_persist: Vec<AfterPersist>,
    /// Applied on every read.
    pub populate: Vec<Populate>,
    pub virtuals: Vec<Virtual>,
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("before_persist", &self.before_persist.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("after_persist", &self.after_persist.iter().map(|s| s.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// The models this service registers.
#[must_use]
pub fn builtin() -> Vec<ModelDescriptor> {
    vec![tour::descriptor(), user::descriptor(), review::descriptor()]
}
