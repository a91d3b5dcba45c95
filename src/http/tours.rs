use super::extract::{Authenticated, JsonBody, QueryPairs};
use super::{AppState, reviews};
use crate::auth::AuthService;
use crate::errors::AppError;
use crate::factory::Reply;
use crate::query::Filter;
use crate::tours;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;

const EDITORS: [&str; 2] = ["admin", "lead-guide"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_all).post(create))
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(tour_stats))
        .route("/monthly-plan/{year}", get(monthly_plan))
        .route("/tours-within/{distance}/center/{latlng}/unit/{unit}", get(tours_within))
        .route("/distances/{latlng}/unit/{unit}", get(distances))
        .route("/{id}", get(get_one).patch(update).delete(delete))
        .route("/{id}/reviews", get(reviews::list_for_tour).post(reviews::create_for_tour))
}

async fn get_all(State(state): State<AppState>, QueryPairs(q): QueryPairs) -> Result<Reply, AppError> {
    state.tours.get_all(q, Filter::True)
}

async fn top_five_cheap(State(state): State<AppState>, QueryPairs(mut q): QueryPairs) -> Result<Reply, AppError> {
    tours::alias_top_tours(&mut q);
    state.tours.get_all(q, Filter::True)
}

async fn tour_stats(State(state): State<AppState>) -> Result<Reply, AppError> {
    tours::tour_stats(&state.db)
}

async fn monthly_plan(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(year): Path<String>,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &["admin", "lead-guide", "guide"])?;
    tours::monthly_plan(&state.db, &year)
}

async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> Result<Reply, AppError> {
    tours::tours_within(&state.db, &distance, &latlng, &unit)
}

async fn distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Reply, AppError> {
    tours::distances(&state.db, &latlng, &unit)
}

async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Result<Reply, AppError> {
    state.tours.get_one(&id)
}

async fn create(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &EDITORS)?;
    state.tours.create_one(&body)
}

async fn update(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &EDITORS)?;
    state.tours.update_one(&id, &body)
}

async fn delete(
    State(state): State<AppState>,
    Authenticated(me): Authenticated,
    Path(id): Path<String>,
) -> Result<Reply, AppError> {
    AuthService::restrict_to(&me, &EDITORS)?;
    state.tours.delete_one(&id)
}
