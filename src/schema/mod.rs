//! Declared field types and constraints for a model, plus the casting and
//! validation passes every write goes through.

mod field;

pub use field::{FieldCheck, FieldDefault, FieldSpec, FieldType, parse_date};

use crate::errors::AppError;
use crate::query::ValueCaster;
use bson::{Bson, Document as BsonDocument};

/// Cross-field rule. `check` returns true when the record is valid.
#[derive(Debug, Clone)]
pub struct DocValidator {
    pub path: &'static str,
    pub message: &'static str,
    pub check: fn(&BsonDocument) -> bool,
    /// Partial updates lack the rest of the record, so most rules skip them.
    pub on_update: bool,
}

/// How much of a record to validate.
#[derive(Debug, Clone, Copy)]
pub enum Validate<'a> {
    /// Every declared field and every record rule (create and save).
    Full,
    /// Only these paths, and only rules marked `on_update` (partial updates).
    Paths(&'a [String]),
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
    pub validators: Vec<DocValidator>,
    /// Compound unique indexes beyond the per-field `unique` flags.
    pub unique_indexes: Vec<Vec<&'static str>>,
}

impl Schema {
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields, validators: Vec::new(), unique_indexes: Vec::new() }
    }

    #[must_use]
    pub fn validator(mut self, v: DocValidator) -> Self {
        self.validators.push(v);
        self
    }

    #[must_use]
    pub fn unique_index(mut self, fields: &[&'static str]) -> Self {
        self.unique_indexes.push(fields.to_vec());
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every unique index to declare on the collection.
    #[must_use]
    pub fn all_unique_indexes(&self) -> Vec<Vec<&'static str>> {
        let mut out: Vec<Vec<&'static str>> =
            self.fields.iter().filter(|f| f.unique).map(|f| vec![f.name]).collect();
        out.extend(self.unique_indexes.iter().cloned());
        out
    }

    #[must_use]
    pub fn hidden_fields(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.hidden).map(|f| f.name).collect()
    }

    /// Casts a client payload. Undeclared keys (including `_id` and `__v`) are
    /// dropped; values that cannot take the declared type fail validation.
    pub fn cast_input(&self, body: &BsonDocument) -> Result<BsonDocument, AppError> {
        let mut out = BsonDocument::new();
        let mut errors = Vec::new();
        for (k, v) in body {
            let Some(spec) = self.field(k) else {
                continue;
            };
            match spec.assign(v) {
                Some(cast) => {
                    out.insert(k.clone(), cast);
                }
                None => errors.push(format!(
                    "Cast to {} failed for value \"{}\" at path \"{}\"",
                    spec.ty.name(),
                    display_raw(v),
                    k
                )),
            }
        }
        if errors.is_empty() { Ok(out) } else { Err(AppError::Validation(errors)) }
    }

    /// Fills absent fields that declare a default.
    pub fn apply_defaults(&self, doc: &mut BsonDocument) {
        for f in &self.fields {
            if let Some(d) = &f.default
                && !doc.contains_key(f.name)
            {
                doc.insert(f.name, d.resolve());
            }
        }
    }

    /// Collects every violated constraint into one `Validation` error.
    pub fn validate(&self, doc: &BsonDocument, scope: Validate<'_>) -> Result<(), AppError> {
        let mut errors = Vec::new();
        match scope {
            Validate::Full => {
                for f in &self.fields {
                    errors.extend(f.violations(doc.get(f.name)));
                }
                for v in &self.validators {
                    if !(v.check)(doc) {
                        errors.push(v.message.to_string());
                    }
                }
            }
            Validate::Paths(paths) => {
                for f in self.fields.iter().filter(|f| paths.iter().any(|p| p == f.name)) {
                    errors.extend(f.violations(doc.get(f.name)));
                }
                for v in self.validators.iter().filter(|v| v.on_update) {
                    if paths.iter().any(|p| p == v.path) && !(v.check)(doc) {
                        errors.push(v.message.to_string());
                    }
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(AppError::Validation(errors)) }
    }
}

/// Query-string values cast against declared types; a failure is a `Cast` error.
impl ValueCaster for Schema {
    fn cast(&self, path: &str, raw: &str) -> Result<Bson, AppError> {
        let top = path.split('.').next().unwrap_or(path);
        match self.field(top) {
            Some(spec) if top == path => {
                let ty = match &spec.ty {
                    // a scalar filter on an array field matches elements
                    FieldType::Array(inner) => inner.as_ref(),
                    other => other,
                };
                ty.cast(&Bson::String(raw.to_string())).ok_or_else(|| AppError::cast(path, raw))
            }
            _ if top == "_id" => crate::types::DocumentId::parse(raw).map(Into::into),
            _ => Ok(crate::query::infer_value(raw)),
        }
    }
}

fn display_raw(v: &Bson) -> String {
    match v {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::number("price").required("A tour must have a price"),
            FieldSpec::number("priceDiscount"),
            FieldSpec::string("difficulty").one_of(&["easy", "medium", "difficult"], "bad difficulty"),
            FieldSpec::boolean("secretTour").default_value(false),
        ])
        .validator(DocValidator {
            path: "priceDiscount",
            message: "discount too high",
            check: |d| match (d.get("priceDiscount"), d.get("price")) {
                (Some(Bson::Int32(pd)), Some(Bson::Int32(p))) => pd < p,
                _ => true,
            },
            on_update: false,
        })
    }

    #[test]
    fn undeclared_keys_are_dropped() {
        let out = schema().cast_input(&doc! { "price": "10", "hacker": true, "_id": "x" }).unwrap();
        assert_eq!(out, doc! { "price": 10 });
    }

    #[test]
    fn bad_cast_is_validation_error() {
        let err = schema().cast_input(&doc! { "price": "cheap" }).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m[0].contains("Cast to Number failed")));
    }

    #[test]
    fn full_validation_runs_record_rules() {
        let s = schema();
        let err = s.validate(&doc! { "price": 10, "priceDiscount": 20 }, Validate::Full).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &vec!["discount too high".to_string()]));
    }

    #[test]
    fn partial_validation_skips_untouched_and_create_only() {
        let s = schema();
        let paths = vec!["priceDiscount".to_string()];
        // price is missing but untouched; the discount rule is create-only
        assert!(s.validate(&doc! { "priceDiscount": 20 }, Validate::Paths(&paths)).is_ok());
        let paths = vec!["difficulty".to_string()];
        assert!(s.validate(&doc! { "difficulty": "extreme" }, Validate::Paths(&paths)).is_err());
    }

    #[test]
    fn defaults_fill_missing_only() {
        let mut d = doc! { "secretTour": true };
        schema().apply_defaults(&mut d);
        assert_eq!(d.get_bool("secretTour").unwrap(), true);
    }

    #[test]
    fn query_cast_failure_is_cast_error() {
        let err = ValueCaster::cast(&schema(), "price", "abc").unwrap_err();
        assert!(matches!(err, AppError::Cast { ref path, .. } if path == "price"));
        assert_eq!(ValueCaster::cast(&schema(), "unknown", "4").unwrap(), Bson::Int32(4));
    }
}
