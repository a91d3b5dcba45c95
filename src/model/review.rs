use super::{AfterPersist, ModelDescriptor, Populate, PopulateKind};
use crate::query::Projection;
use crate::ratings;
use crate::schema::{FieldSpec, Schema};

pub const COLLECTION: &str = "reviews";

#[must_use]
pub fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::string("review").trim().required("Please provide a review"),
        FieldSpec::number("rating")
            .required("Please provide rating")
            .min(1.0, "Rating must be above 1")
            .max(5.0, "Rating must be below 5"),
        FieldSpec::date("createdAt").default_now(),
        FieldSpec::object_id("tour").required("Review must belong to a tour"),
        FieldSpec::object_id("user").required("Review must belong to a user"),
    ])
    // one review per user per tour
    .unique_index(&["tour", "user"])
}

#[must_use]
pub fn descriptor() -> ModelDescriptor {
    ModelDescriptor {
        name: "review",
        collection: COLLECTION,
        schema: schema(),
        hidden_when: None,
        derived: &[],
        before_persist: Vec::new(),
        after_persist: vec![AfterPersist {
            name: "recompute tour ratings",
            run: ratings::after_review_write,
        }],
        populate: vec![Populate {
            path: "user",
            target: super::user::COLLECTION,
            kind: PopulateKind::One,
            select: Some(Projection::Include(vec!["name".into(), "photo".into()])),
        }],
        virtuals: Vec::new(),
    }
}
