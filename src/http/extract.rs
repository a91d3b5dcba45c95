//! Request extractors that fail with `AppError`.

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::http::AppState;
use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use serde_json::Value;

/// Query keys that may repeat; all their values are kept.
pub const QUERY_WHITELIST: [&str; 6] =
    ["duration", "ratingsQuantity", "ratingsAverage", "maxGroupSize", "difficulty", "price"];

/// Drops repeated keys except the last occurrence, unless whitelisted.
#[must_use]
pub fn dedupe_params(pairs: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    for (k, v) in pairs {
        let base = k.split('[').next().unwrap_or(&k);
        if !QUERY_WHITELIST.contains(&base) {
            out.retain(|(ek, _)| *ek != k);
        }
        out.push((k, v));
    }
    out
}

/// Query-string pairs in arrival order, with parameter pollution removed.
#[derive(Debug, Clone, Default)]
pub struct QueryPairs(pub Vec<(String, String)>);

impl<S: Send + Sync> FromRequestParts<S> for QueryPairs {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(Self(dedupe_params(pairs)))
    }
}

/// A JSON body. Oversized bodies map to 413.
#[derive(Debug, Clone)]
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(v)) => Ok(Self(v)),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(AppError::PayloadTooLarge("Request body is too large".into()))
            }
            Err(e) => Err(AppError::BadRequest(e.body_text())),
        }
    }
}

/// Value of the `jwt` cookie, if sent.
#[must_use]
pub fn jwt_cookie(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(name, _)| *name == "jwt")
        .map(|(_, v)| v.to_string())
}

/// The logged-in caller. Rejects with 401 when the request carries no valid token.
#[derive(Debug, Clone)]
pub struct Authenticated(pub CurrentUser);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
        let cookie = jwt_cookie(parts);
        state.auth.protect(header, cookie.as_deref()).map(Self)
    }
}
