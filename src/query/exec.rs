use crate::collection::Collection;
use crate::document::Document;
use crate::telemetry;

use super::eval::{compare_docs, eval_filter, project};
use super::types::{Filter, FindOptions};

/// Filter, sort, project, then skip/limit, in that order.
pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions) -> Vec<Document> {
    let started = std::time::Instant::now();
    let mut docs: Vec<Document> =
        col.get_all_documents().into_iter().filter(|d| eval_filter(&d.data, filter)).collect();

    if let Some(sort) = &opts.sort {
        // stable: ties keep creation order
        docs.sort_by(|a, b| compare_docs(&a.data, &b.data, sort));
    }

    let skip = opts.skip.unwrap_or(0);
    let limit = opts.limit.unwrap_or(usize::MAX);
    let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

    if let Some(p) = &opts.projection {
        for d in &mut docs {
            d.data = project(&d.data, p);
        }
    }
    telemetry::log_query(&col.name_str(), "find", started, docs.len());
    docs
}

pub fn find_one(col: &Collection, filter: &Filter) -> Option<Document> {
    col.get_all_documents().into_iter().find(|d| eval_filter(&d.data, filter))
}

#[must_use]
pub fn count_docs(col: &Collection, filter: &Filter) -> usize {
    let started = std::time::Instant::now();
    let n = col.get_all_documents().iter().filter(|d| eval_filter(&d.data, filter)).count();
    telemetry::log_query(&col.name_str(), "count", started, n);
    n
}
