//! A small aggregation pipeline over BSON documents: enough stages for the
//! tour statistics, monthly plan, distance listing and rating maintenance.

mod exec;
mod expr;

pub use exec::run_pipeline;
pub use expr::{Accumulator, Expr};

use crate::query::geo::GeoPoint;
use crate::query::{Filter, Projection, SortSpec};

#[derive(Debug, Clone)]
pub struct Group {
    /// Grouping key; `Expr::Literal(Bson::Null)` folds everything into one group.
    pub id: Expr,
    pub fields: Vec<(String, Accumulator)>,
}

/// Distance-ordered scan from a point. Only valid as the first stage.
#[derive(Debug, Clone)]
pub struct GeoNear {
    pub near: GeoPoint,
    /// Field holding the GeoJSON point.
    pub key: String,
    pub distance_field: String,
    /// Applied to the distance in metres.
    pub distance_multiplier: f64,
}

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Group(Group),
    Sort(Vec<SortSpec>),
    Limit(usize),
    /// One output record per element of the array at this path.
    Unwind(String),
    AddFields(Vec<(String, Expr)>),
    Project(Projection),
    GeoNear(GeoNear),
}

impl Stage {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Group(_) => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Unwind(_) => "$unwind",
            Self::AddFields(_) => "$addFields",
            Self::Project(_) => "$project",
            Self::GeoNear(_) => "$geoNear",
        }
    }
}
