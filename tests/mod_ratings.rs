mod common;

use bson::{Bson, doc};
use common::*;
use natours::Database;
use natours::database::WriteMode;
use natours::errors::AppError;
use natours::model::{AfterPersist, WriteContext, review};

#[test]
fn tour_without_reviews_has_baseline() {
    let db = db();
    let t = add_tour(&db, "The Forest Hiker", 397);
    assert_eq!(ratings_of(&db, &t), (0, 4.5));
}

#[test]
fn first_review_sets_rating() {
    let db = db();
    let t = add_tour(&db, "The Forest Hiker", 397);
    let u = add_user(&db, "Lourdes", "lourdes@example.io", "user");
    add_review(&db, &t, &u, 5.0);
    assert_eq!(ratings_of(&db, &t), (1, 5.0));
}

#[test]
fn average_is_rounded_to_one_decimal() {
    let db = db();
    let t = add_tour(&db, "The Sea Explorer", 497);
    for (i, r) in [4.0, 5.0, 5.0].into_iter().enumerate() {
        let u = add_user(&db, "Reviewer", &format!("r{i}@example.io"), "user");
        add_review(&db, &t, &u, r);
    }
    assert_eq!(ratings_of(&db, &t), (3, 4.7));
}

#[test]
fn deleting_only_review_restores_baseline() {
    let db = db();
    let t = add_tour(&db, "The Snow Adventurer", 997);
    let u = add_user(&db, "Sophie", "sophie@example.io", "user");
    let r = add_review(&db, &t, &u, 2.0);
    assert_eq!(ratings_of(&db, &t), (1, 2.0));
    db.delete(review::COLLECTION, &r).unwrap();
    assert_eq!(ratings_of(&db, &t), (0, 4.5));
}

#[test]
fn updating_a_rating_recomputes() {
    let db = db();
    let t = add_tour(&db, "The City Wanderer", 1197);
    let u = add_user(&db, "Max", "max@example.io", "user");
    let r = add_review(&db, &t, &u, 2.0);
    db.update(review::COLLECTION, &r, &doc! { "rating": 4 }, WriteMode::Partial).unwrap();
    assert_eq!(ratings_of(&db, &t), (1, 4.0));
}

#[test]
fn moving_a_review_recomputes_both_tours() {
    let db = db();
    let a = add_tour(&db, "The Park Camper", 1497);
    let b = add_tour(&db, "The Sports Lover", 2997);
    let u = add_user(&db, "Ayla", "ayla@example.io", "user");
    let r = add_review(&db, &a, &u, 3.0);
    db.update(review::COLLECTION, &r, &doc! { "tour": Bson::from(b.clone()) }, WriteMode::Partial).unwrap();
    assert_eq!(ratings_of(&db, &a), (0, 4.5));
    assert_eq!(ratings_of(&db, &b), (1, 3.0));
}

#[test]
fn duplicate_review_is_rejected_and_first_kept() {
    let db = db();
    let t = add_tour(&db, "The Wine Taster", 1997);
    let u = add_user(&db, "Leo", "leo@example.io", "user");
    add_review(&db, &t, &u, 5.0);
    let second = doc! {
        "review": "Again",
        "rating": 1,
        "tour": Bson::from(t.clone()),
        "user": Bson::from(u.clone()),
    };
    let err = db.create(review::COLLECTION, &second).unwrap_err();
    assert!(matches!(err, AppError::DuplicateKey { .. }), "{err:?}");
    assert_eq!(db.count(review::COLLECTION, natours::query::Filter::True).unwrap(), 1);
    assert_eq!(ratings_of(&db, &t), (1, 5.0));
}

#[test]
fn client_cannot_write_derived_ratings() {
    let db = db();
    let mut body = tour_doc("The Northern Lights", 1497);
    body.insert("ratingsAverage", 1.2);
    body.insert("ratingsQuantity", 99);
    let t = db.create(natours::model::tour::COLLECTION, &body).unwrap();
    assert_eq!(ratings_of(&db, &t.id), (0, 4.5));
}

fn failing_recompute(_: &Database, _: &WriteContext) -> Result<(), AppError> {
    Err(AppError::Internal("ratings store unavailable".into()))
}

#[test]
fn recompute_failure_keeps_the_review_write() {
    let mut db = Database::in_memory().unwrap();
    let mut reviews = review::descriptor();
    reviews.after_persist = vec![AfterPersist { name: "recompute tour ratings", run: failing_recompute }];
    db.register(reviews).unwrap();

    let t = add_tour(&db, "The Star Gazer Trip", 2997);
    let u = add_user(&db, "Nova", "nova@example.io", "user");
    let r = add_review(&db, &t, &u, 5.0);
    assert!(db.find_by_id(review::COLLECTION, &r).unwrap().is_some());
    // the failed recompute left the tour alone
    assert_eq!(ratings_of(&db, &t), (0, 4.5));

    let updated = db.update(review::COLLECTION, &r, &doc! { "rating": 2 }, WriteMode::Partial).unwrap();
    assert_eq!(updated.data.get_i32("rating").unwrap(), 2);
    let stored = db.find_by_id(review::COLLECTION, &r).unwrap().unwrap();
    assert_eq!(stored.data.get_i32("rating").unwrap(), 2);

    db.delete(review::COLLECTION, &r).unwrap();
    assert!(db.find_by_id(review::COLLECTION, &r).unwrap().is_none());
}
