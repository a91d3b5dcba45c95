//! Review routes. Every route needs a login; only plain users write reviews.

use super::AppState;
use super::extract::{Authenticated, JsonBody, QueryPairs};
use crate::auth::{AuthService, CurrentUser};
use crate::errors::AppError;
use crate::factory::Reply;
use crate::query::Filter;
use crate::types::DocumentId;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list).post(create)).route("/{id}", get(get_one).patch(update).delete(delete))
}

/// Fills `tour`/`user` from the route and the caller when the body omits them.
fn with_refs(mut body: Value, tour: Option<&str>, me: &CurrentUser) -> Value {
    if let Value::Object(map) = &mut body {
        if let Some(tour) = tour {
            map.entry("tour").or_insert_with(|| Value::String(tour.to_string()));
        }
        map.entry("user").or_insert_with(|| Value::String(me.id.to_hex()));
    }
    body
}

async fn list(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    QueryPairs(q): QueryPairs,
) -> Result<Reply, AppError> {
    state.reviews.get_all(q, Filter::True)
}

pub(super) async fn list_for_tour(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(tour): Path<String>,
    QueryPairs(q): QueryPairs,
) -> Result<Reply, AppError> {
    let tour = DocumentId::parse(&tour)?;
    state.reviews.get_all(q, Filter::eq("tour", tour))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["user"])?;
    state.reviews.create_one(&with_refs(body, None, &me))
}

pub(super) async fn create_for_tour(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(tour): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["user"])?;
    state.reviews.create_one(&with_refs(body, Some(&tour), &me))
}

async fn get_one(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    state.reviews.get_one(&id)
}

async fn update(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["user", "admin"])?;
    state.reviews.update_one(&id, &body)
}

async fn delete(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["user", "admin"])?;
    state.reviews.delete_one(&id)
}
