mod common;

use common::*;
use natours::errors::AppError;
use natours::factory::Crud;
use natours::model::{review, tour};
use natours::query::Filter;
use serde_json::{Value, json};

fn names(reply: &natours::factory::Reply) -> Vec<String> {
    reply.body.as_ref().unwrap()["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn seeded(n: usize) -> Crud {
    let db = db();
    for i in 0..n {
        add_tour(&db, &format!("Tour number {i:03}"), 100 + i32::try_from(i).unwrap());
    }
    Crud::new(db, tour::COLLECTION)
}

#[test]
fn create_returns_201_envelope() {
    let crud = Crud::new(db(), tour::COLLECTION);
    let body = json!({
        "name": "The Test Tour Name",
        "duration": 7,
        "maxGroupSize": 15,
        "difficulty": "medium",
        "price": 497,
        "summary": "Exploring",
        "imageCover": "tour-1-cover.jpg",
    });
    let reply = crud.create_one(&body).unwrap();
    assert_eq!(reply.status, 201);
    let data = &reply.body.unwrap()["data"]["data"];
    assert_eq!(data["slug"], "the-test-tour-name");
    assert_eq!(data["durationWeeks"], json!(1.0));
    assert!(data.get("createdAt").is_none());
    assert_eq!(data["id"], data["_id"]);
}

#[test]
fn create_reports_every_violation() {
    let crud = Crud::new(db(), tour::COLLECTION);
    let err = crud.create_one(&json!({ "name": "short", "difficulty": "extreme" })).unwrap_err();
    let AppError::Validation(msgs) = err else { panic!("expected validation error") };
    assert!(msgs.iter().any(|m| m.contains("more or equal than 10")));
    assert!(msgs.iter().any(|m| m.contains("Difficulty is either")));
    assert!(msgs.iter().any(|m| m == "A tour must have a price"));
}

#[test]
fn pagination_windows() {
    let crud = seeded(7);
    let page2 = crud.get_all(q(&[("sort", "price"), ("page", "2"), ("limit", "3")]), Filter::True).unwrap();
    assert_eq!(names(&page2), vec!["Tour number 003", "Tour number 004", "Tour number 005"]);
    let last = crud.get_all(q(&[("sort", "price"), ("page", "3"), ("limit", "3")]), Filter::True).unwrap();
    assert_eq!(names(&last), vec!["Tour number 006"]);
    let beyond = crud.get_all(q(&[("page", "9"), ("limit", "3")]), Filter::True).unwrap();
    assert_eq!(beyond.body.unwrap()["results"], json!(0));
}

#[test]
fn bad_page_means_first_page() {
    let crud = seeded(4);
    for page in ["0", "-2", "abc"] {
        let r = crud.get_all(q(&[("sort", "price"), ("page", page), ("limit", "2")]), Filter::True).unwrap();
        assert_eq!(names(&r), vec!["Tour number 000", "Tour number 001"], "page={page}");
    }
}

#[test]
fn default_limit_is_one_hundred() {
    let crud = seeded(105);
    let r = crud.get_all(vec![], Filter::True).unwrap();
    assert_eq!(r.body.unwrap()["results"], json!(100));
}

#[test]
fn max_limit_caps_requests() {
    let crud = seeded(12).max_limit(Some(5));
    let r = crud.get_all(q(&[("limit", "50")]), Filter::True).unwrap();
    assert_eq!(r.body.unwrap()["results"], json!(5));
}

#[test]
fn malformed_id_is_cast_error() {
    let crud = seeded(1);
    for id in ["abc", "5c88fa8cf4afda39709c2955x", ""] {
        let err = crud.get_one(id).unwrap_err();
        assert!(matches!(err, AppError::Cast { .. }), "{id}: {err:?}");
        assert_eq!(err.status_code(), 400);
    }
    let missing = crud.get_one("5c88fa8cf4afda39709c2955").unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
    assert!(matches!(crud.delete_one("nope"), Err(AppError::Cast { .. })));
    assert!(matches!(crud.update_one("nope", &json!({})), Err(AppError::Cast { .. })));
}

#[test]
fn update_validates_patched_fields_only() {
    let crud = seeded(1);
    let all = crud.get_all(vec![], Filter::True).unwrap().body.unwrap();
    let id = all["data"]["data"][0]["_id"].as_str().unwrap().to_string();

    let ok = crud.update_one(&id, &json!({ "price": 999 })).unwrap();
    assert_eq!(ok.body.unwrap()["data"]["data"]["price"], json!(999));

    let bad = crud.update_one(&id, &json!({ "difficulty": "extreme" })).unwrap_err();
    assert!(matches!(bad, AppError::Validation(_)));
}

#[test]
fn delete_then_gone() {
    let crud = seeded(1);
    let all = crud.get_all(vec![], Filter::True).unwrap().body.unwrap();
    let id = all["data"]["data"][0]["_id"].as_str().unwrap().to_string();
    let reply = crud.delete_one(&id).unwrap();
    assert_eq!(reply.status, 204);
    assert!(reply.body.is_none());
    assert!(matches!(crud.get_one(&id), Err(AppError::NotFound(_))));
}

#[test]
fn get_one_populates_reviews_and_guides() {
    let db = db();
    let guide = add_user(&db, "Guide Person", "guide@example.io", "guide");
    let mut body = tour_doc("The Guided Explorer", 300);
    body.insert("guides", vec![bson::Bson::from(guide.clone())]);
    let t = db.create(tour::COLLECTION, &body).unwrap().id;
    let author = add_user(&db, "Author", "author@example.io", "user");
    add_review(&db, &t, &author, 4.0);

    let crud = Crud::new(db.clone(), tour::COLLECTION).with_populate(tour::reviews_populate());
    let data: Value = crud.get_one(&t.to_hex()).unwrap().body.unwrap()["data"]["data"].clone();
    assert_eq!(data["guides"][0]["name"], "Guide Person");
    assert!(data["guides"][0].get("password").is_none());
    let reviews = data["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["user"]["name"], "Author");
    assert!(reviews[0]["user"].get("email").is_none());

    // nested listing scoped by the parent tour
    let reviews = Crud::new(db, review::COLLECTION);
    let scoped = reviews.get_all(vec![], Filter::eq("tour", t)).unwrap();
    assert_eq!(scoped.body.unwrap()["results"], json!(1));
}
