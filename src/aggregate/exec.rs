use super::expr::AccState;
use super::{GeoNear, Group, Stage};
use crate::errors::AppError;
use crate::query::geo::GeoPoint;
use crate::query::{compare_bson, compare_docs, eval_filter, get_path, project};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

/// Runs `stages` in order over `docs`.
pub fn run_pipeline(docs: Vec<BsonDocument>, stages: &[Stage]) -> Result<Vec<BsonDocument>, AppError> {
    let mut docs = docs;
    for (i, stage) in stages.iter().enumerate() {
        docs = match stage {
            Stage::Match(f) => docs.into_iter().filter(|d| eval_filter(d, f)).collect(),
            Stage::Group(g) => group(&docs, g),
            Stage::Sort(spec) => {
                docs.sort_by(|a, b| compare_docs(a, b, spec));
                docs
            }
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Unwind(path) => unwind(docs, path),
            Stage::AddFields(fields) => docs
                .into_iter()
                .map(|mut d| {
                    let computed: Vec<(String, Bson)> =
                        fields.iter().map(|(k, e)| (k.clone(), e.eval(&d))).collect();
                    for (k, v) in computed {
                        d.insert(k, v);
                    }
                    d
                })
                .collect(),
            Stage::Project(p) => docs.iter().map(|d| project(d, p)).collect(),
            Stage::GeoNear(g) => {
                if i != 0 {
                    return Err(AppError::Internal(
                        "$geoNear is only valid as the first stage in a pipeline".into(),
                    ));
                }
                geo_near(docs, g)
            }
        };
    }
    Ok(docs)
}

fn group(docs: &[BsonDocument], g: &Group) -> Vec<BsonDocument> {
    // first-seen key order
    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for d in docs {
        let key = g.id.eval(d);
        let idx = match groups.iter().position(|(k, _)| same_key(k, &key)) {
            Some(i) => i,
            None => {
                groups.push((key, g.fields.iter().map(|(_, acc)| acc.state()).collect()));
                groups.len() - 1
            }
        };
        let states = &mut groups[idx].1;
        for ((_, acc), st) in g.fields.iter().zip(states.iter_mut()) {
            acc.feed(st, d);
        }
    }
    groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for ((name, _), st) in g.fields.iter().zip(states) {
                out.insert(name.clone(), st.finish());
            }
            out
        })
        .collect()
}

fn same_key(a: &Bson, b: &Bson) -> bool {
    a == b || compare_bson(a, b) == Ordering::Equal && std::mem::discriminant(a) != std::mem::discriminant(b)
}

fn unwind(docs: Vec<BsonDocument>, path: &str) -> Vec<BsonDocument> {
    let mut out = Vec::with_capacity(docs.len());
    for d in docs {
        match get_path(&d, path) {
            Some(Bson::Array(items)) => {
                for item in items.clone() {
                    let mut copy = d.clone();
                    copy.insert(path.to_string(), item);
                    out.push(copy);
                }
            }
            Some(Bson::Null) | None => {}
            Some(_) => out.push(d),
        }
    }
    out
}

fn geo_near(docs: Vec<BsonDocument>, g: &GeoNear) -> Vec<BsonDocument> {
    let mut with_dist: Vec<(f64, BsonDocument)> = docs
        .into_iter()
        .filter_map(|d| {
            let p = get_path(&d, &g.key).and_then(GeoPoint::from_bson)?;
            Some((g.near.distance_m(p), d))
        })
        .collect();
    with_dist.sort_by(|a, b| a.0.total_cmp(&b.0));
    with_dist
        .into_iter()
        .map(|(meters, mut d)| {
            d.insert(g.distance_field.clone(), Bson::Double(meters * g.distance_multiplier));
            d
        })
        .collect()
}
