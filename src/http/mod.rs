//! HTTP surface: an axum router under `/api/v1` with auth extraction,
//! per-IP rate limiting, a body limit, request logging, and the error
//! envelopes.

pub mod error;
pub mod extract;
pub mod middleware;
mod reviews;
mod tours;
mod users;

use crate::Database;
use crate::auth::{AuthService, CookieOptions, Mailer, TokenSigner};
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::factory::{Crud, Reply};
use crate::model::{review, tour, user};
use crate::telemetry::RateLimiter;
use axum::extract::{DefaultBodyLimit, OriginalUri};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Shared handles every handler sees. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub auth: Arc<AuthService>,
    pub tours: Arc<Crud>,
    pub users: Arc<Crud>,
    pub reviews: Arc<Crud>,
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<Self, AppError> {
        let signer = TokenSigner::new(&config.jwt_secret, &config.jwt_expires_in)?;
        let cookie =
            CookieOptions { expires_in_days: config.jwt_cookie_expires_in, secure: config.env.is_production() };
        let auth = AuthService::new(db.clone(), signer, mailer, cookie);
        let max = config.max_limit;
        Ok(Self {
            tours: Arc::new(Crud::new(db.clone(), tour::COLLECTION).with_populate(tour::reviews_populate()).max_limit(max)),
            users: Arc::new(Crud::new(db.clone(), user::COLLECTION).max_limit(max)),
            reviews: Arc::new(Crud::new(db.clone(), review::COLLECTION).max_limit(max)),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_max,
                Duration::from_secs(config.rate_limit_window_secs),
            )),
            auth: Arc::new(auth),
            config: Arc::new(config),
            db,
        })
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        match self.body {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        }
    }
}

/// Runs CPU-heavy work (password hashing) off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| AppError::Internal(format!("blocking task: {e}")))?
}

async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("Can't find {uri} on this server!"))
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/tours", tours::routes())
        .nest("/users", users::routes())
        .nest("/reviews", reviews::routes());
    let limited = Router::new()
        .nest("/api/v1", api)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit));

    limited
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(axum::middleware::from_fn_with_state(state.clone(), error::error_envelope))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::request_log))
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves until ctrl-c.
pub async fn serve(state: AppState) -> Result<(), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("App running on port {}...", state.config.port);
    let db = state.db.clone();
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("shutdown signal: {e}");
            }
            log::info!("shutting down");
        })
        .await?;
    let saved = db.save_snapshot()?;
    log::info!("snapshot saved ({saved} records)");
    Ok(())
}
