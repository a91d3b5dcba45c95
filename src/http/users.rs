use super::extract::{Authenticated, JsonBody, QueryPairs};
use super::{AppState, blocking};
use crate::auth::{AuthReply, AuthService};
use crate::errors::AppError;
use crate::factory::Reply;
use crate::query::Filter;
use crate::users;
use axum::extract::{Path, State};
use axum::http::header::{HOST, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/{token}", patch(reset_password))
        .route("/updateMyPassword", patch(update_my_password))
        .route("/me", get(me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", delete(delete_me))
        .route("/", get(get_all).post(create))
        .route("/{id}", get(get_one).patch(update).delete(remove))
}

/// Token envelope plus the `jwt` cookie.
fn token_response(state: &AppState, reply: &AuthReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
    let mut res = (status, Json(reply.body())).into_response();
    match HeaderValue::from_str(&state.auth.cookie().header_value(&reply.token)) {
        Ok(v) => {
            res.headers_mut().insert(SET_COOKIE, v);
        }
        Err(e) => log::warn!("jwt cookie not set: {e}"),
    }
    res
}

async fn signup(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    let reply = blocking(move || auth.signup(&body)).await?;
    Ok(token_response(&state, &reply))
}

async fn login(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    let reply = blocking(move || auth.login(&body)).await?;
    Ok(token_response(&state, &reply))
}

async fn logout() -> Response {
    let mut res = Json(json!({ "status": "success" })).into_response();
    res.headers_mut().insert(SET_COOKIE, HeaderValue::from_static("jwt=loggedout; Max-Age=10; Path=/; HttpOnly"));
    res
}

async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let host = headers.get(HOST).and_then(|h| h.to_str().ok()).unwrap_or("localhost");
    let scheme = headers.get("x-forwarded-proto").and_then(|h| h.to_str().ok()).unwrap_or("http");
    let base_url = format!("{scheme}://{host}");
    let auth = state.auth.clone();
    let out = blocking(move || auth.forgot_password(&body, &base_url)).await?;
    Ok(Json(out).into_response())
}

async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    let reply = blocking(move || auth.reset_password(&token, &body)).await?;
    Ok(token_response(&state, &reply))
}

async fn update_my_password(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let auth = state.auth.clone();
    let reply = blocking(move || auth.update_password(&me, &body)).await?;
    Ok(token_response(&state, &reply))
}

async fn me(State(state): State<AppState>, Authenticated(me): Authenticated) -> Result<Reply, AppError> {
    users::get_me(&state.db, &me)
}

async fn update_me(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    users::update_me(&state.db, &me, &body)
}

async fn delete_me(State(state): State<AppState>, Authenticated(me): Authenticated) -> Result<Reply, AppError> {
    users::delete_me(&state.db, &me)
}

async fn get_all(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    QueryPairs(q): QueryPairs,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin"])?;
    state.users.get_all(q, Filter::True)
}

async fn create(Authenticated(me): Authenticated) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin"])?;
    users::create_user()
}

async fn get_one(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin"])?;
    state.users.get_one(&id)
}

/// Admin edits go through validation; passwords are changed only by their owner.
async fn update(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
    JsonBody(mut body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin"])?;
    if let Some(map) = body.as_object_mut() {
        map.remove("password");
        map.remove("passwordConfirm");
    }
    state.users.update_one(&id, &body)
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin"])?;
    state.users.delete_one(&id)
}
