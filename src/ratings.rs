//! Keeps each tour's `ratingsQuantity` / `ratingsAverage` in step with its reviews.
//!
//! The rule runs after a review write commits. It recomputes from scratch, so
//! concurrent writers converge on the last recomputation.

use crate::Database;
use crate::aggregate::{Accumulator, Expr, Group, Stage};
use crate::errors::AppError;
use crate::model::{WriteContext, review, tour};
use crate::query::Filter;
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument, doc};

pub const BASELINE_AVERAGE: f64 = tour::DEFAULT_RATINGS_AVERAGE;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingStats {
    pub quantity: i64,
    pub average: f64,
}

impl RatingStats {
    /// A tour nobody has reviewed.
    pub const BASELINE: Self = Self { quantity: 0, average: BASELINE_AVERAGE };
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Aggregates the reviews of `tour_id` and writes the result onto the tour,
/// bypassing validation. A tour that no longer exists is left alone.
pub fn calc_average_ratings(db: &Database, tour_id: DocumentId) -> Result<RatingStats, AppError> {
    let stages = vec![
        Stage::Match(Filter::eq("tour", tour_id)),
        Stage::Group(Group {
            id: Expr::field("tour"),
            fields: vec![
                ("nRating".into(), Accumulator::count()),
                ("avgRating".into(), Accumulator::Avg(Expr::field("rating"))),
            ],
        }),
    ];
    let groups = db.aggregate(review::COLLECTION, stages)?;
    let stats = groups.first().map_or(RatingStats::BASELINE, |g| RatingStats {
        quantity: match g.get("nRating") {
            Some(Bson::Int32(n)) => i64::from(*n),
            Some(Bson::Int64(n)) => *n,
            _ => 0,
        },
        average: g.get_f64("avgRating").map_or(BASELINE_AVERAGE, round1),
    });

    let quantity = i32::try_from(stats.quantity).map_or(Bson::Int64(stats.quantity), Bson::Int32);
    let written = db.set_fields(
        tour::COLLECTION,
        &tour_id,
        doc! { "ratingsQuantity": quantity, "ratingsAverage": stats.average },
    )?;
    if !written {
        log::debug!("ratings for missing tour {tour_id} not written");
    }
    Ok(stats)
}

fn tour_ref(doc: Option<&BsonDocument>) -> Option<DocumentId> {
    match doc?.get("tour")? {
        Bson::ObjectId(oid) => Some(DocumentId(*oid)),
        _ => None,
    }
}

/// Post-write stage for reviews. Recomputes every tour the write touched: the
/// tour before the write and, when a review was moved, the one after it.
pub fn after_review_write(db: &Database, ctx: &WriteContext) -> Result<(), AppError> {
    let mut tours = Vec::with_capacity(2);
    for t in [tour_ref(ctx.before.as_ref()), tour_ref(ctx.after.as_ref())].into_iter().flatten() {
        if !tours.contains(&t) {
            tours.push(t);
        }
    }
    let mut first_err = None;
    for t in tours {
        if let Err(e) = calc_average_ratings(db, t) {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}
