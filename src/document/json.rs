//! Conversions between client-facing JSON and stored BSON.
//!
//! Ids leave the store as 24-char hex strings and dates as RFC 3339 strings, so
//! responses read like plain JSON rather than extended JSON.

use crate::errors::AppError;
use bson::{Bson, Document as BsonDocument};
use serde_json::{Map, Value};

#[must_use]
pub fn bson_to_json(v: &Bson) -> Value {
    match v {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(rfc3339(dt.timestamp_millis())),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(d) => document_to_json(d),
        other => other.clone().into_relaxed_extjson(),
    }
}

#[must_use]
pub fn document_to_json(doc: &BsonDocument) -> Value {
    let mut out = Map::with_capacity(doc.len());
    for (k, v) in doc {
        out.insert(k.clone(), bson_to_json(v));
    }
    Value::Object(out)
}

/// Plain structural conversion; typed casting against a schema happens in `schema`.
#[must_use]
pub fn json_to_bson(v: &Value) -> Bson {
    match v {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => {
            let mut d = BsonDocument::new();
            for (k, v) in map {
                d.insert(k.clone(), json_to_bson(v));
            }
            Bson::Document(d)
        }
    }
}

/// Converts a JSON value that must be an object into a BSON document.
pub fn json_object_to_document(v: &Value) -> Result<BsonDocument, AppError> {
    match json_to_bson(v) {
        Bson::Document(d) => Ok(d),
        _ => Err(AppError::BadRequest("Request body must be a JSON object".into())),
    }
}

pub(crate) fn rfc3339(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
