use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::geo::GeoPoint;
use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, Order, Projection, SortSpec};

pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::In { path, values } => get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op, value } => {
            get_path(doc, path).is_some_and(|v| match v {
                // array fields match when any element does
                Bson::Array(items) if !matches!(value, Bson::Array(_)) => {
                    items.iter().any(|item| cmp_matches(item, *op, value))
                }
                _ => cmp_matches(v, *op, value),
            })
        }
        Filter::GeoWithin { path, center, radius } => get_path(doc, path)
            .and_then(GeoPoint::from_bson)
            .is_some_and(|p| center.central_angle(p) <= *radius),
    }
}

fn cmp_matches(v: &Bson, op: CmpOp, value: &Bson) -> bool {
    match op {
        CmpOp::Eq => values_equal(v, value),
        // ordering comparisons only hold between comparable kinds
        _ if !comparable(v, value) => false,
        CmpOp::Gt => compare_bson(v, value) == Ordering::Greater,
        CmpOp::Gte => compare_bson(v, value) != Ordering::Less,
        CmpOp::Lt => compare_bson(v, value) == Ordering::Less,
        CmpOp::Lte => compare_bson(v, value) != Ordering::Greater,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return as_f64_num(a) == as_f64_num(b);
    }
    a == b
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let va = get_path(a, &s.field);
        let vb = get_path(b, &s.field);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    match v {
        Bson::Array(items) => items.iter().any(|i| set.iter().any(|x| values_equal(i, x))),
        _ => set.iter().any(|x| values_equal(v, x)),
    }
}

/// Resolves a dotted path through nested documents.
#[must_use]
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Bson::Document(d) => cur = d.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    if is_num(a) && is_num(b) {
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::DateTime(x), T::DateTime(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Cross-type sort order: null < numbers < strings < objects < arrays < ids < bools < dates.
fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) | T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 12,
        T::MaxKey => 255,
    }
}

/// Applies a projection to top-level fields. Inclusion always keeps `_id`.
#[must_use]
pub fn project(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include(fields) => {
            let mut out = BsonDocument::new();
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
            for f in fields {
                let top = f.split('.').next().unwrap_or(f);
                if let Some(v) = doc.get(top) {
                    out.insert(top.to_string(), v.clone());
                }
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                out.remove(f);
            }
            out
        }
    }
}
