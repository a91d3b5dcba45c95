//! Hidden records (secret tours, deactivated users) are excluded from every
//! read through one predicate per model. Callers can narrow it, never widen it.

use crate::aggregate::Stage;
use crate::model::ModelDescriptor;
use crate::query::Filter;

/// `field != value` for models with a hiding rule, `True` otherwise.
#[must_use]
pub fn predicate(model: &ModelDescriptor) -> Filter {
    model
        .hidden_when
        .as_ref()
        .map_or(Filter::True, |h| Filter::ne(h.field, h.value.clone()))
}

/// Conjunction of the model predicate and the caller's filter.
#[must_use]
pub fn scope(model: &ModelDescriptor, caller: Filter) -> Filter {
    predicate(model).and(caller)
}

/// Inserts the predicate as a `Match` stage at the front of `stages`, or right
/// after a leading `GeoNear`, which has to stay first.
#[must_use]
pub fn scope_pipeline(model: &ModelDescriptor, mut stages: Vec<Stage>) -> Vec<Stage> {
    let pred = predicate(model);
    if matches!(pred, Filter::True) {
        return stages;
    }
    let at = usize::from(matches!(stages.first(), Some(Stage::GeoNear(_))));
    stages.insert(at, Stage::Match(pred));
    stages
}
