use crate::errors::AppError;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};

/// Internal version marker carried by every stored record and hidden from default reads.
pub const VERSION_KEY: &str = "__v";

/// A stored record: its id plus the BSON body (which repeats the id under `_id`).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
}

impl Document {
    /// Wraps a fresh body, assigning a new id and the initial version marker.
    #[must_use]
    pub fn new(data: BsonDocument) -> Self {
        Self::with_id(DocumentId::new(), data)
    }

    #[must_use]
    pub fn with_id(id: DocumentId, mut data: BsonDocument) -> Self {
        data.insert("_id", Bson::ObjectId(id.0));
        if !data.contains_key(VERSION_KEY) {
            data.insert(VERSION_KEY, Bson::Int32(0));
        }
        Self { id, data }
    }

    /// Rebuilds a record from a body that already carries `_id` (snapshots, imports).
    pub fn from_stored(data: BsonDocument) -> Result<Self, AppError> {
        match data.get("_id") {
            Some(Bson::ObjectId(oid)) => Ok(Self::with_id(DocumentId(*oid), data)),
            Some(Bson::String(s)) => {
                let id = DocumentId::parse(s)?;
                Ok(Self::with_id(id, data))
            }
            None => Ok(Self::new(data)),
            Some(other) => Err(AppError::cast("_id", other.to_string())),
        }
    }

    /// Replaces the body, keeping the id stable.
    pub fn update(&mut self, mut new_data: BsonDocument) {
        new_data.insert("_id", Bson::ObjectId(self.id.0));
        self.data = new_data;
    }
}
