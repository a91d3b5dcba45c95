use super::{BeforePersist, HiddenWhen, ModelDescriptor, PersistCtx};
use crate::auth::password;
use crate::errors::AppError;
use crate::schema::{DocValidator, FieldSpec, Schema};
use bson::{Bson, Document as BsonDocument};
use regex::Regex;
use std::sync::LazyLock;

pub const COLLECTION: &str = "users";
pub const ROLES: [&str; 4] = ["user", "guide", "lead-guide", "admin"];

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

fn is_email(v: &Bson) -> bool {
    match (v, EMAIL_RE.as_ref()) {
        (Bson::String(s), Some(re)) => re.is_match(s),
        _ => false,
    }
}

fn passwords_match(doc: &BsonDocument) -> bool {
    doc.get("passwordConfirm") == doc.get("password")
}

#[must_use]
pub fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::string("name").trim().required("Please tell us your name"),
        FieldSpec::string("email")
            .required("Please provide your email")
            .unique()
            .trim()
            .lowercase()
            .check(is_email, "Please provide a valid email"),
        FieldSpec::string("photo"),
        FieldSpec::string("role")
            .one_of(&ROLES, "Role is either: user, guide, lead-guide, admin")
            .default_value("user"),
        FieldSpec::string("password")
            .required("Please provide a password")
            .min_len(8, "A password must have at least 8 characters")
            .hidden(),
        FieldSpec::string("passwordConfirm").required("Please confirm your password"),
        FieldSpec::date("passwordChangedAt"),
        FieldSpec::string("passwordResetToken").hidden(),
        FieldSpec::date("passwordResetExpires").hidden(),
        FieldSpec::boolean("active").default_value(true).hidden(),
    ])
    .validator(DocValidator {
        path: "passwordConfirm",
        message: "Passwords are not the same",
        check: passwords_match,
        on_update: false,
    })
}

/// Hashes a newly assigned password and drops its confirmation.
fn hash_password(ctx: &mut PersistCtx<'_>) -> Result<(), AppError> {
    if !ctx.is_modified("password") {
        return Ok(());
    }
    if let Ok(plain) = ctx.doc.get_str("password") {
        let hashed = password::hash_password(plain)?;
        ctx.doc.insert("password", hashed);
    }
    ctx.doc.remove("passwordConfirm");
    Ok(())
}

/// Backdated one second so a token issued right after the change stays valid.
fn stamp_password_change(ctx: &mut PersistCtx<'_>) -> Result<(), AppError> {
    if !ctx.is_modified("password") || ctx.is_new() {
        return Ok(());
    }
    let at = bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() - 1000);
    ctx.doc.insert("passwordChangedAt", at);
    Ok(())
}

#[must_use]
pub fn descriptor() -> ModelDescriptor {
    ModelDescriptor {
        name: "user",
        collection: COLLECTION,
        schema: schema(),
        hidden_when: Some(HiddenWhen { field: "active", value: Bson::Boolean(false) }),
        derived: &[],
        before_persist: vec![
            BeforePersist { name: "hash password", run: hash_password },
            BeforePersist { name: "stamp password change", run: stamp_password_change },
        ],
        after_persist: Vec::new(),
        populate: Vec::new(),
        virtuals: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn email_shape() {
        assert!(is_email(&Bson::String("jonas@example.io".into())));
        assert!(!is_email(&Bson::String("jonas@example".into())));
        assert!(!is_email(&Bson::String("jo nas@example.io".into())));
    }

    #[test]
    fn confirm_must_match() {
        assert!(passwords_match(&doc! { "password": "pass1234", "passwordConfirm": "pass1234" }));
        assert!(!passwords_match(&doc! { "password": "pass1234", "passwordConfirm": "pass12345" }));
    }
}
