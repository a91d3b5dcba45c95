use super::geo::GeoPoint;
use bson::Bson;
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse. Requests over a limit are
// rejected when the query is built, never truncated.
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 32;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    /// `-field` sorts descending, `field` ascending.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some("") => None,
            Some(f) => Some(Self { field: f.to_string(), order: Order::Desc }),
            None if token.is_empty() => None,
            None => Some(Self { field: token.trim_start_matches('+').to_string(), order: Order::Asc }),
        }
    }
}

/// Which top-level fields a read returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Only these fields (plus `_id`).
    Include(Vec<String>),
    /// Everything except these fields.
    Exclude(Vec<String>),
}

/// Options for `find_docs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<SortSpec>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// Query-string operator token (`gte`, `gt`, `lte`, `lt`).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            "eq" => Some(Self::Eq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Not(Box<Filter>),
    In { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    /// Point at `path` lies within `radius` radians of `center` on the sphere.
    GeoWithin { path: String, center: GeoPoint, radius: f64 },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Eq, value: value.into() }
    }

    /// Matches when `path` is missing or holds anything other than `value`.
    pub fn ne(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Not(Box::new(Self::eq(path, value)))
    }

    /// Conjunction that drops `True` operands and flattens nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f {
                Self::True => {}
                Self::And(fs) => parts.extend(fs),
                f => parts.push(f),
            }
        }
        match parts.len() {
            0 => Self::True,
            1 => parts.pop().unwrap_or(Self::True),
            _ => Self::And(parts),
        }
    }
}
