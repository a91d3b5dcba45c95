//! Self-service operations on the authenticated user.

use crate::Database;
use crate::auth::CurrentUser;
use crate::database::WriteMode;
use crate::document::json_to_bson;
use crate::errors::AppError;
use crate::factory::Reply;
use crate::model::user;
use bson::{Document as BsonDocument, doc};
use serde_json::{Value, json};

/// Fields a user may change on their own record.
pub const UPDATE_ME_FIELDS: [&str; 2] = ["name", "email"];

pub fn get_me(db: &Database, me: &CurrentUser) -> Result<Reply, AppError> {
    let doc = db.find_by_id(user::COLLECTION, &me.id)?.ok_or_else(|| AppError::not_found("user"))?;
    Ok(Reply::data(200, db.present(user::COLLECTION, &doc, &[])?))
}

/// Updates name/email; every other key in `body` is ignored.
pub fn update_me(db: &Database, me: &CurrentUser, body: &Value) -> Result<Reply, AppError> {
    if body.get("password").is_some() || body.get("passwordConfirm").is_some() {
        return Err(AppError::BadRequest(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }
    let mut patch = BsonDocument::new();
    for k in UPDATE_ME_FIELDS {
        if let Some(v) = body.get(k) {
            patch.insert(k, json_to_bson(v));
        }
    }
    let updated = db.update(user::COLLECTION, &me.id, &patch, WriteMode::Partial)?;
    let user = db.present(user::COLLECTION, &updated, &[])?;
    Ok(Reply { status: 200, body: Some(json!({ "status": "success", "data": { "user": user } })) })
}

/// Deactivates the caller. The record stays, hidden from every read.
pub fn delete_me(db: &Database, me: &CurrentUser) -> Result<Reply, AppError> {
    db.update(user::COLLECTION, &me.id, &doc! { "active": false }, WriteMode::Unchecked)?;
    log::info!("user {} deactivated", me.id);
    Ok(Reply::no_content())
}

/// Admins cannot create users directly.
pub fn create_user() -> Result<Reply, AppError> {
    Err(AppError::Operational("This route is not defined! Please use /signup instead".into()))
}
