use super::mailer::{Email, Mailer};
use super::password::verify_password;
use super::token::{INVALID_TOKEN, TokenSigner};
use crate::Database;
use crate::database::WriteMode;
use crate::document::{Document, json_to_bson};
use crate::errors::AppError;
use crate::model::user;
use crate::query::{CmpOp, Filter};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument, doc};
use rand::RngCore;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const RESET_TOKEN_TTL_MINS: i64 = 10;
/// Fields a client may set on signup. `role` is not among them.
pub const SIGNUP_FIELDS: [&str; 5] = ["name", "email", "password", "passwordConfirm", "photo"];

/// The authenticated caller, as resolved by `protect`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: DocumentId,
    pub role: String,
    /// Stored record, password hash included.
    pub doc: Document,
}

/// Token response: `{status, token, data: {user}}` plus the cookie to set.
#[derive(Debug, Clone)]
pub struct AuthReply {
    pub status: u16,
    pub token: String,
    pub user: Value,
}

impl AuthReply {
    #[must_use]
    pub fn body(&self) -> Value {
        json!({ "status": "success", "token": self.token, "data": { "user": self.user } })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub expires_in_days: i64,
    /// Set in production.
    pub secure: bool,
}

impl CookieOptions {
    /// `Set-Cookie` value carrying the token.
    #[must_use]
    pub fn header_value(&self, token: &str) -> String {
        let expires = chrono::Utc::now() + chrono::Duration::days(self.expires_in_days);
        let mut v = format!(
            "jwt={token}; Expires={}; Max-Age={}; Path=/; HttpOnly",
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.expires_in_days.saturating_mul(86_400)
        );
        if self.secure {
            v.push_str("; Secure");
        }
        v
    }
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn pick(body: &Value, keys: &[&str]) -> BsonDocument {
    let mut out = BsonDocument::new();
    for k in keys {
        if let Some(v) = body.get(*k) {
            out.insert(*k, json_to_bson(v));
        }
    }
    out
}

fn sha256_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Signup, login, route protection and the password flows.
pub struct AuthService {
    db: Arc<Database>,
    signer: TokenSigner,
    mailer: Arc<dyn Mailer>,
    cookie: CookieOptions,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").field("signer", &self.signer).field("cookie", &self.cookie).finish_non_exhaustive()
    }
}

impl AuthService {
    #[must_use]
    pub fn new(db: Arc<Database>, signer: TokenSigner, mailer: Arc<dyn Mailer>, cookie: CookieOptions) -> Self {
        Self { db, signer, mailer, cookie }
    }

    #[must_use]
    pub const fn cookie(&self) -> &CookieOptions {
        &self.cookie
    }

    fn send_token(&self, status: u16, doc: &Document) -> Result<AuthReply, AppError> {
        let token = self.signer.sign(&doc.id.to_hex())?;
        let user = self.db.present(user::COLLECTION, doc, &[])?;
        Ok(AuthReply { status, token, user })
    }

    pub fn signup(&self, body: &Value) -> Result<AuthReply, AppError> {
        let doc = self.db.create(user::COLLECTION, &pick(body, &SIGNUP_FIELDS))?;
        log::info!("user {} signed up", doc.id);
        self.send_token(201, &doc)
    }

    pub fn login(&self, body: &Value) -> Result<AuthReply, AppError> {
        let (Some(email), Some(password)) = (str_field(body, "email"), str_field(body, "password")) else {
            return Err(AppError::BadRequest("Please provide email and password!".into()));
        };
        let found = self.db.find_one(user::COLLECTION, Filter::eq("email", email.trim().to_lowercase()))?;
        let hash = found.as_ref().and_then(|u| u.data.get_str("password").ok());
        match (found.as_ref(), hash) {
            (Some(u), Some(h)) if verify_password(password, h) => self.send_token(200, u),
            _ => Err(AppError::Auth("Incorrect email or password".into())),
        }
    }

    /// Resolves the caller from a `Bearer` header or the `jwt` cookie.
    pub fn protect(&self, authorization: Option<&str>, cookie_jwt: Option<&str>) -> Result<CurrentUser, AppError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| cookie_jwt.filter(|t| !t.is_empty() && *t != "loggedout"));
        let Some(token) = token else {
            return Err(AppError::Auth("You are not logged in! Please log in to get access.".into()));
        };
        let claims = self.signer.verify(token)?;
        let id = DocumentId::parse(&claims.id).map_err(|_| AppError::Auth(INVALID_TOKEN.into()))?;
        let Some(doc) = self.db.find_by_id(user::COLLECTION, &id)? else {
            return Err(AppError::Auth("The user belonging to this token does no longer exist.".into()));
        };
        if changed_password_after(&doc.data, claims.iat) {
            return Err(AppError::Auth("User recently changed password! Please log in again.".into()));
        }
        let role = doc.data.get_str("role").unwrap_or("user").to_string();
        Ok(CurrentUser { id, role, doc })
    }

    pub fn restrict_to(user: &CurrentUser, roles: &[&str]) -> Result<(), AppError> {
        if roles.contains(&user.role.as_str()) {
            Ok(())
        } else {
            Err(AppError::Forbidden("You do not have permission to perform this action".into()))
        }
    }

    /// Stores a hashed reset token and mails the plain one. If the mail cannot
    /// be sent the token is cleared again.
    pub fn forgot_password(&self, body: &Value, base_url: &str) -> Result<Value, AppError> {
        let email = str_field(body, "email").map(|e| e.trim().to_lowercase()).unwrap_or_default();
        let Some(u) = self.db.find_one(user::COLLECTION, Filter::eq("email", email))? else {
            return Err(AppError::NotFound("There is no user with that email address.".into()));
        };

        let mut raw = [0u8; 32];
        rand::rng().fill_bytes(&mut raw);
        let reset_token = hex::encode(raw);
        let expires =
            bson::DateTime::from_millis(bson::DateTime::now().timestamp_millis() + RESET_TOKEN_TTL_MINS * 60_000);
        self.db.update(
            user::COLLECTION,
            &u.id,
            &doc! { "passwordResetToken": sha256_hex(&reset_token), "passwordResetExpires": expires },
            WriteMode::Unchecked,
        )?;

        let url = format!("{base_url}/api/v1/users/resetPassword/{reset_token}");
        let email = Email {
            to: u.data.get_str("email").unwrap_or_default().to_string(),
            subject: format!("Your password reset token (valid for {RESET_TOKEN_TTL_MINS} min)"),
            text: format!(
                "Forgot your password? Submit a PATCH request with your new password and passwordConfirm to: {url}.\nIf you didn't forget your password, please ignore this email!"
            ),
        };
        if let Err(e) = self.mailer.send(&email) {
            log::error!("reset mail to user {} failed: {e}", u.id);
            self.db.update(
                user::COLLECTION,
                &u.id,
                &doc! { "passwordResetToken": Bson::Null, "passwordResetExpires": Bson::Null },
                WriteMode::Unchecked,
            )?;
            return Err(AppError::Operational("There was an error sending the email. Try again later!".into()));
        }
        Ok(json!({ "status": "success", "message": "Token sent to email!" }))
    }

    pub fn reset_password(&self, reset_token: &str, body: &Value) -> Result<AuthReply, AppError> {
        let filter = Filter::eq("passwordResetToken", sha256_hex(reset_token)).and(Filter::Cmp {
            path: "passwordResetExpires".into(),
            op: CmpOp::Gt,
            value: Bson::DateTime(bson::DateTime::now()),
        });
        let Some(u) = self.db.find_one(user::COLLECTION, filter)? else {
            return Err(AppError::BadRequest("Token is invalid or has expired".into()));
        };
        let mut patch = pick(body, &["password", "passwordConfirm"]);
        for k in ["password", "passwordConfirm"] {
            if !patch.contains_key(k) {
                patch.insert(k, Bson::Null);
            }
        }
        patch.insert("passwordResetToken", Bson::Null);
        patch.insert("passwordResetExpires", Bson::Null);
        let updated = self.db.update(user::COLLECTION, &u.id, &patch, WriteMode::Save)?;
        self.send_token(200, &updated)
    }

    pub fn update_password(&self, current: &CurrentUser, body: &Value) -> Result<AuthReply, AppError> {
        let stored = current.doc.data.get_str("password").unwrap_or_default();
        let given = str_field(body, "passwordCurrent").unwrap_or_default();
        if !verify_password(given, stored) {
            return Err(AppError::Auth("Your current password is wrong.".into()));
        }
        let mut patch = pick(body, &["password", "passwordConfirm"]);
        for k in ["password", "passwordConfirm"] {
            if !patch.contains_key(k) {
                patch.insert(k, Bson::Null);
            }
        }
        let updated = self.db.update(user::COLLECTION, &current.id, &patch, WriteMode::Save)?;
        self.send_token(200, &updated)
    }
}

/// True when the password changed after a token issued at `iat` (seconds).
fn changed_password_after(user: &BsonDocument, iat: i64) -> bool {
    match user.get("passwordChangedAt") {
        Some(Bson::DateTime(at)) => at.timestamp_millis() / 1000 > iat,
        _ => false,
    }
}
