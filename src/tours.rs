//! Tour operations beyond plain CRUD: the top-five alias, statistics, the
//! monthly plan and the geospatial queries.

use crate::Database;
use crate::aggregate::{Accumulator, Expr, GeoNear, Group, Stage};
use crate::document::document_to_json;
use crate::errors::AppError;
use crate::factory::Reply;
use crate::model::tour;
use crate::query::geo::{DistanceUnit, GeoPoint};
use crate::query::{CmpOp, Filter, FindOptions, Order, Projection, SortSpec};
use bson::Bson;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

/// Presets the query-string for the five best-rated, cheapest tours.
pub fn alias_top_tours(params: &mut Vec<(String, String)>) {
    params.retain(|(k, _)| !matches!(k.as_str(), "limit" | "sort" | "fields"));
    params.push(("limit".into(), "5".into()));
    params.push(("sort".into(), "-ratingsAverage,price".into()));
    params.push(("fields".into(), "name,price,ratingsAverage,summary,difficulty".into()));
}

fn envelope(key: &str, rows: &[bson::Document]) -> Reply {
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), Value::Array(rows.iter().map(document_to_json).collect()));
    Reply { status: 200, body: Some(json!({ "status": "success", "data": data })) }
}

/// Per-difficulty statistics over well-rated tours, cheapest first.
pub fn tour_stats(db: &Database) -> Result<Reply, AppError> {
    let stages = vec![
        Stage::Match(Filter::Cmp { path: "ratingsAverage".into(), op: CmpOp::Gte, value: Bson::Double(4.5) }),
        Stage::Group(Group {
            id: Expr::ToUpper(Box::new(Expr::field("difficulty"))),
            fields: vec![
                ("numTours".into(), Accumulator::count()),
                ("numRatings".into(), Accumulator::Sum(Expr::field("ratingsQuantity"))),
                ("avgRating".into(), Accumulator::Avg(Expr::field("ratingsAverage"))),
                ("avgPrice".into(), Accumulator::Avg(Expr::field("price"))),
                ("minPrice".into(), Accumulator::Min(Expr::field("price"))),
                ("maxPrice".into(), Accumulator::Max(Expr::field("price"))),
            ],
        }),
        Stage::Sort(vec![SortSpec { field: "avgPrice".into(), order: Order::Asc }]),
    ];
    Ok(envelope("stats", &db.aggregate(tour::COLLECTION, stages)?))
}

/// Tour starts per month of `year`, busiest month first.
pub fn monthly_plan(db: &Database, year: &str) -> Result<Reply, AppError> {
    let y: i32 = year.trim().parse().map_err(|_| AppError::cast("year", year))?;
    let bound = |y: i32| {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0)
            .single()
            .map(|d| Bson::DateTime(bson::DateTime::from_millis(d.timestamp_millis())))
            .ok_or_else(|| AppError::cast("year", year))
    };
    let (from, to) = (bound(y)?, bound(y.saturating_add(1))?);
    let stages = vec![
        Stage::Unwind("startDates".into()),
        Stage::Match(
            Filter::Cmp { path: "startDates".into(), op: CmpOp::Gte, value: from }
                .and(Filter::Cmp { path: "startDates".into(), op: CmpOp::Lt, value: to }),
        ),
        Stage::Group(Group {
            id: Expr::Month(Box::new(Expr::field("startDates"))),
            fields: vec![
                ("numTourStarts".into(), Accumulator::count()),
                ("tours".into(), Accumulator::Push(Expr::field("name"))),
            ],
        }),
        Stage::AddFields(vec![("month".into(), Expr::field("_id"))]),
        Stage::Project(Projection::Exclude(vec!["_id".into()])),
        Stage::Sort(vec![SortSpec { field: "numTourStarts".into(), order: Order::Desc }]),
        Stage::Limit(12),
    ];
    Ok(envelope("plan", &db.aggregate(tour::COLLECTION, stages)?))
}

/// Parses `lat,lng`.
pub fn parse_lat_lng(raw: &str) -> Result<GeoPoint, AppError> {
    let bad = || AppError::BadRequest("Please provide latitude and longitude in the format lat,lng.".into());
    let (lat, lng) = raw.split_once(',').ok_or_else(bad)?;
    let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
    let lng: f64 = lng.trim().parse().map_err(|_| bad())?;
    if !(lat.is_finite() && lng.is_finite()) || lat.abs() > 90.0 || lng.abs() > 180.0 {
        return Err(bad());
    }
    Ok(GeoPoint::new(lng, lat))
}

/// Tours whose start location lies within `distance` of `latlng`.
pub fn tours_within(db: &Database, distance: &str, latlng: &str, unit: &str) -> Result<Reply, AppError> {
    let d: f64 = distance
        .trim()
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| AppError::cast("distance", distance))?;
    let center = parse_lat_lng(latlng)?;
    let radius = d / DistanceUnit::parse(unit).earth_radius();
    let filter = Filter::GeoWithin { path: "startLocation".into(), center, radius };
    let docs = db.find(tour::COLLECTION, filter, &FindOptions::default())?;
    Ok(Reply::list(db.present_all(tour::COLLECTION, &docs)?))
}

/// Distance from `latlng` to every tour's start, nearest first.
pub fn distances(db: &Database, latlng: &str, unit: &str) -> Result<Reply, AppError> {
    let near = parse_lat_lng(latlng)?;
    let stages = vec![
        Stage::GeoNear(GeoNear {
            near,
            key: "startLocation".into(),
            distance_field: "distance".into(),
            distance_multiplier: DistanceUnit::parse(unit).from_meters(),
        }),
        Stage::Project(Projection::Include(vec!["distance".into(), "name".into()])),
    ];
    Ok(envelope("data", &db.aggregate(tour::COLLECTION, stages)?))
}
