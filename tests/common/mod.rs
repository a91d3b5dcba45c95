#![allow(dead_code)]

use bson::{Bson, doc};
use natours::Database;
use natours::model::{review, tour, user};
use natours::types::DocumentId;
use std::sync::Arc;

pub fn db() -> Arc<Database> {
    Arc::new(Database::in_memory().unwrap())
}

/// A valid tour body; `name` must be 10..=40 characters.
pub fn tour_doc(name: &str, price: i32) -> bson::Document {
    doc! {
        "name": name,
        "duration": 5,
        "maxGroupSize": 10,
        "difficulty": "easy",
        "price": price,
        "summary": "A short summary",
        "imageCover": "cover.jpg",
    }
}

pub fn add_tour(db: &Database, name: &str, price: i32) -> DocumentId {
    db.create(tour::COLLECTION, &tour_doc(name, price)).unwrap().id
}

pub fn add_user(db: &Database, name: &str, email: &str, role: &str) -> DocumentId {
    let body = doc! {
        "name": name,
        "email": email,
        "role": role,
        "password": "pass1234",
        "passwordConfirm": "pass1234",
    };
    db.create(user::COLLECTION, &body).unwrap().id
}

pub fn add_review(db: &Database, tour: &DocumentId, user: &DocumentId, rating: f64) -> DocumentId {
    let body = doc! {
        "review": "Loved it",
        "rating": rating,
        "tour": Bson::from(tour.clone()),
        "user": Bson::from(user.clone()),
    };
    db.create(review::COLLECTION, &body).unwrap().id
}

/// `(ratingsQuantity, ratingsAverage)` as stored.
pub fn ratings_of(db: &Database, tour_id: &DocumentId) -> (i64, f64) {
    let t = db.find_by_id(tour::COLLECTION, tour_id).unwrap().unwrap();
    let qty = match t.data.get("ratingsQuantity") {
        Some(Bson::Int32(i)) => i64::from(*i),
        Some(Bson::Int64(i)) => *i,
        other => panic!("ratingsQuantity missing: {other:?}"),
    };
    let avg = match t.data.get("ratingsAverage") {
        Some(Bson::Double(f)) => *f,
        Some(Bson::Int32(i)) => f64::from(*i),
        other => panic!("ratingsAverage missing: {other:?}"),
    };
    (qty, avg)
}
