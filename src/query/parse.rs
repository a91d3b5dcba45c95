use crate::errors::AppError;
use bson::Bson;

use super::types::CmpOp;

/// Turns a raw query-string value into a typed value for `path`.
pub trait ValueCaster: Send + Sync {
    fn cast(&self, path: &str, raw: &str) -> Result<Bson, AppError>;
}

/// Caster for fields with no declared type.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferCaster;

impl ValueCaster for InferCaster {
    fn cast(&self, _path: &str, raw: &str) -> Result<Bson, AppError> {
        Ok(infer_value(raw))
    }
}

/// Integer, then float, then boolean, else string.
#[must_use]
pub fn infer_value(raw: &str) -> Bson {
    if let Ok(i) = raw.parse::<i64>() {
        return i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Bson::Double(f);
    }
    match raw {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(raw.to_string()),
    }
}

/// Splits `duration[gte]` into `("duration", Some(Gte))`. Keys without a
/// bracket suffix are plain equality. Unknown operators are rejected.
pub fn parse_param_key(key: &str) -> Result<(String, Option<CmpOp>), AppError> {
    let Some(open) = key.find('[') else {
        return Ok((key.to_string(), None));
    };
    let Some(inner) = key[open + 1..].strip_suffix(']') else {
        return Ok((key.to_string(), None));
    };
    let field = &key[..open];
    if field.is_empty() {
        return Err(AppError::BadRequest(format!("Malformed query key: {key}")));
    }
    CmpOp::from_token(inner)
        .map(|op| (field.to_string(), Some(op)))
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported query operator: {inner}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_operators() {
        assert_eq!(parse_param_key("duration[gte]").unwrap(), ("duration".into(), Some(CmpOp::Gte)));
        assert_eq!(parse_param_key("price[lt]").unwrap(), ("price".into(), Some(CmpOp::Lt)));
        assert_eq!(parse_param_key("difficulty").unwrap(), ("difficulty".into(), None));
        assert!(parse_param_key("price[regex]").is_err());
    }

    #[test]
    fn inference() {
        assert_eq!(infer_value("5"), Bson::Int32(5));
        assert_eq!(infer_value("4.7"), Bson::Double(4.7));
        assert_eq!(infer_value("true"), Bson::Boolean(true));
        assert_eq!(infer_value("easy"), Bson::String("easy".into()));
        assert_eq!(infer_value("NaN"), Bson::String("NaN".into()));
    }
}
