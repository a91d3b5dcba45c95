use crate::errors::AppError;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type CollectionName = String;

/// Opaque record identifier, stored under `_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub ObjectId);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parses a 24-char hex id. A malformed id is a cast failure, never a miss.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        ObjectId::parse_str(raw).map(Self).map_err(|_| AppError::cast("_id", raw))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl From<DocumentId> for bson::Bson {
    fn from(id: DocumentId) -> Self {
        Self::ObjectId(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_id_is_cast_error() {
        let err = DocumentId::parse("not-an-id").unwrap_err();
        assert!(matches!(err, AppError::Cast { ref path, .. } if path == "_id"));
    }

    #[test]
    fn hex_roundtrip() {
        let id = DocumentId::new();
        assert_eq!(DocumentId::parse(&id.to_hex()).unwrap(), id);
    }
}
