use crate::query::geo::GeoPoint;
use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    /// GeoJSON point, possibly carrying extra descriptive keys.
    Point,
    Array(Box<FieldType>),
}

impl FieldType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Date => "date",
            Self::ObjectId => "ObjectId",
            Self::Point => "Point",
            Self::Array(_) => "Array",
        }
    }

    /// Coerces `v` into this type, the way a document mapper casts assigned values.
    #[must_use]
    pub fn cast(&self, v: &Bson) -> Option<Bson> {
        match (self, v) {
            (_, Bson::Null) => Some(Bson::Null),
            (Self::String, Bson::String(_)) => Some(v.clone()),
            (Self::String, Bson::Int32(i)) => Some(Bson::String(i.to_string())),
            (Self::String, Bson::Int64(i)) => Some(Bson::String(i.to_string())),
            (Self::String, Bson::Double(f)) => Some(Bson::String(f.to_string())),
            (Self::String, Bson::Boolean(b)) => Some(Bson::String(b.to_string())),
            (Self::String, Bson::ObjectId(o)) => Some(Bson::String(o.to_hex())),
            (Self::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => Some(v.clone()),
            (Self::Number, Bson::String(s)) => cast_number(s),
            (Self::Number, Bson::Boolean(b)) => Some(Bson::Int32(i32::from(*b))),
            (Self::Boolean, Bson::Boolean(_)) => Some(v.clone()),
            (Self::Boolean, Bson::String(s)) => match s.as_str() {
                "true" | "1" | "yes" => Some(Bson::Boolean(true)),
                "false" | "0" | "no" => Some(Bson::Boolean(false)),
                _ => None,
            },
            (Self::Boolean, Bson::Int32(i)) if *i == 0 || *i == 1 => Some(Bson::Boolean(*i == 1)),
            (Self::Date, Bson::DateTime(_)) => Some(v.clone()),
            (Self::Date, Bson::String(s)) => parse_date(s).map(Bson::DateTime),
            (Self::Date, Bson::Int64(ms)) => Some(Bson::DateTime(bson::DateTime::from_millis(*ms))),
            (Self::Date, Bson::Int32(ms)) => {
                Some(Bson::DateTime(bson::DateTime::from_millis(i64::from(*ms))))
            }
            (Self::ObjectId, Bson::ObjectId(_)) => Some(v.clone()),
            (Self::ObjectId, Bson::String(s)) => ObjectId::parse_str(s).ok().map(Bson::ObjectId),
            (Self::ObjectId, Bson::Document(d)) => match d.get("_id") {
                Some(id) => Self::ObjectId.cast(id),
                None => None,
            },
            (Self::Point, Bson::Document(d)) => cast_point(d),
            (Self::Array(inner), Bson::Array(items)) => items
                .iter()
                .map(|i| inner.cast(i))
                .collect::<Option<Vec<Bson>>>()
                .map(Bson::Array),
            // a scalar assigned to an array field becomes a one-element array
            (Self::Array(inner), scalar) => inner.cast(scalar).map(|b| Bson::Array(vec![b])),
            _ => None,
        }
    }
}

fn cast_number(s: &str) -> Option<Bson> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32));
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Bson::Double)
}

fn cast_point(d: &BsonDocument) -> Option<Bson> {
    let p = GeoPoint::from_bson(&Bson::Document(d.clone()))?;
    let mut out = d.clone();
    out.insert("type", "Point");
    out.insert("coordinates", vec![Bson::Double(p.lng), Bson::Double(p.lat)]);
    Some(Bson::Document(out))
}

/// Accepts RFC 3339, bare dates, and `date,HH:MM` / `date HH:MM` forms.
#[must_use]
pub fn parse_date(s: &str) -> Option<bson::DateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(bson::DateTime::from_millis(dt.timestamp_millis()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d,%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(bson::DateTime::from_millis(Utc.from_utc_datetime(&naive).timestamp_millis()));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(bson::DateTime::from_millis(Utc.from_utc_datetime(&naive).timestamp_millis()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    Value(Bson),
    Now,
}

impl FieldDefault {
    #[must_use]
    pub fn resolve(&self) -> Bson {
        match self {
            Self::Value(v) => v.clone(),
            Self::Now => Bson::DateTime(bson::DateTime::now()),
        }
    }
}

/// Extra per-field check: the predicate returns true for valid values.
#[derive(Debug, Clone, Copy)]
pub struct FieldCheck {
    pub check: fn(&Bson) -> bool,
    pub message: &'static str,
}

/// Declared constraints for one top-level field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: Option<String>,
    pub unique: bool,
    pub trim: bool,
    pub lowercase: bool,
    pub min: Option<(f64, String)>,
    pub max: Option<(f64, String)>,
    pub min_len: Option<(usize, String)>,
    pub max_len: Option<(usize, String)>,
    pub one_of: Option<(Vec<&'static str>, String)>,
    pub default: Option<FieldDefault>,
    pub hidden: bool,
    /// Rounds numbers to this many decimals on assignment.
    pub round: Option<i32>,
    pub checks: Vec<FieldCheck>,
}

impl FieldSpec {
    #[must_use]
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: None,
            unique: false,
            trim: false,
            lowercase: false,
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            one_of: None,
            default: None,
            hidden: false,
            round: None,
            checks: Vec::new(),
        }
    }

    #[must_use]
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }
    #[must_use]
    pub const fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }
    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }
    #[must_use]
    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldType::Date)
    }
    #[must_use]
    pub const fn object_id(name: &'static str) -> Self {
        Self::new(name, FieldType::ObjectId)
    }
    #[must_use]
    pub const fn point(name: &'static str) -> Self {
        Self::new(name, FieldType::Point)
    }
    #[must_use]
    pub fn array(name: &'static str, of: FieldType) -> Self {
        Self::new(name, FieldType::Array(Box::new(of)))
    }

    #[must_use]
    pub fn required(mut self, message: &str) -> Self {
        self.required = Some(message.to_string());
        self
    }
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    #[must_use]
    pub const fn trim(mut self) -> Self {
        self.trim = true;
        self
    }
    #[must_use]
    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }
    #[must_use]
    pub fn min(mut self, min: f64, message: &str) -> Self {
        self.min = Some((min, message.to_string()));
        self
    }
    #[must_use]
    pub fn max(mut self, max: f64, message: &str) -> Self {
        self.max = Some((max, message.to_string()));
        self
    }
    #[must_use]
    pub fn min_len(mut self, n: usize, message: &str) -> Self {
        self.min_len = Some((n, message.to_string()));
        self
    }
    #[must_use]
    pub fn max_len(mut self, n: usize, message: &str) -> Self {
        self.max_len = Some((n, message.to_string()));
        self
    }
    #[must_use]
    pub fn one_of(mut self, values: &[&'static str], message: &str) -> Self {
        self.one_of = Some((values.to_vec(), message.to_string()));
        self
    }
    #[must_use]
    pub fn default_value(mut self, v: impl Into<Bson>) -> Self {
        self.default = Some(FieldDefault::Value(v.into()));
        self
    }
    #[must_use]
    pub fn default_now(mut self) -> Self {
        self.default = Some(FieldDefault::Now);
        self
    }
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
    #[must_use]
    pub const fn round(mut self, decimals: i32) -> Self {
        self.round = Some(decimals);
        self
    }
    #[must_use]
    pub fn check(mut self, check: fn(&Bson) -> bool, message: &'static str) -> Self {
        self.checks.push(FieldCheck { check, message });
        self
    }

    /// Casts and normalises an assigned value. `None` means the cast failed.
    #[must_use]
    pub fn assign(&self, v: &Bson) -> Option<Bson> {
        let mut out = self.ty.cast(v)?;
        if let Bson::String(s) = &mut out {
            if self.trim {
                *s = s.trim().to_string();
            }
            if self.lowercase {
                *s = s.to_lowercase();
            }
        }
        if let Some(decimals) = self.round {
            out = round_number(&out, decimals);
        }
        Some(out)
    }

    /// Constraint messages violated by `v`; `v == None` means the field is absent.
    #[must_use]
    pub fn violations(&self, v: Option<&Bson>) -> Vec<String> {
        let present = match v {
            None | Some(Bson::Null) => None,
            Some(Bson::String(s)) if s.is_empty() => None,
            Some(other) => Some(other),
        };
        let Some(v) = present else {
            return self.required.iter().cloned().collect();
        };
        let mut out = Vec::new();
        if let Some(n) = as_f64(v) {
            if let Some((min, msg)) = &self.min
                && n < *min
            {
                out.push(msg.clone());
            }
            if let Some((max, msg)) = &self.max
                && n > *max
            {
                out.push(msg.clone());
            }
        }
        if let Bson::String(s) = v {
            let len = s.chars().count();
            if let Some((n, msg)) = &self.min_len
                && len < *n
            {
                out.push(msg.clone());
            }
            if let Some((n, msg)) = &self.max_len
                && len > *n
            {
                out.push(msg.clone());
            }
            if let Some((allowed, msg)) = &self.one_of
                && !allowed.contains(&s.as_str())
            {
                out.push(msg.clone());
            }
        }
        for c in &self.checks {
            if !(c.check)(v) {
                out.push(c.message.to_string());
            }
        }
        out
    }
}

fn round_number(v: &Bson, decimals: i32) -> Bson {
    match as_f64(v) {
        Some(f) => {
            let factor = 10f64.powi(decimals);
            Bson::Double((f * factor).round() / factor)
        }
        None => v.clone(),
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_cast_from_strings() {
        assert_eq!(FieldType::Number.cast(&Bson::String("497".into())), Some(Bson::Int32(497)));
        assert_eq!(FieldType::Number.cast(&Bson::String("abc".into())), None);
    }

    #[test]
    fn dates_in_seed_format() {
        let d = parse_date("2021-06-19,10:00").unwrap();
        assert_eq!(d.timestamp_millis(), 1_624_096_800_000);
        assert!(parse_date("2021-06-19").is_some());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn assign_trims_lowercases_rounds() {
        let f = FieldSpec::string("email").trim().lowercase();
        assert_eq!(f.assign(&Bson::String("  A@B.IO ".into())), Some(Bson::String("a@b.io".into())));
        let r = FieldSpec::number("ratingsAverage").round(1);
        assert_eq!(r.assign(&Bson::Double(4.666)), Some(Bson::Double(4.7)));
    }

    #[test]
    fn violations_collect_messages() {
        let f = FieldSpec::string("name")
            .required("A tour must have a name")
            .min_len(10, "too short")
            .max_len(40, "too long");
        assert_eq!(f.violations(None), vec!["A tour must have a name".to_string()]);
        assert_eq!(f.violations(Some(&Bson::String("short".into()))), vec!["too short".to_string()]);
        assert!(f.violations(Some(&Bson::String("The Forest Hiker".into()))).is_empty());
    }

    #[test]
    fn scalar_into_array_field() {
        let t = FieldType::Array(Box::new(FieldType::String));
        assert_eq!(t.cast(&Bson::String("x".into())), Some(Bson::Array(vec![Bson::String("x".into())])));
    }
}
