mod core;
pub mod json;

pub use self::core::{Document, VERSION_KEY};
pub use json::{bson_to_json, document_to_json, json_object_to_document, json_to_bson};
