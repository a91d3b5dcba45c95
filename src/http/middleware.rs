use crate::errors::AppError;
use crate::http::AppState;
use crate::telemetry::HTTP_TARGET;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::Instant;

pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tags each request with an id and logs it when the response is ready.
/// Development logs at info; production at debug.
pub async fn request_log(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let id = uuid::Uuid::new_v4().to_string();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let mut res = next.run(req).await;
    let level = if state.config.env.is_production() { log::Level::Debug } else { log::Level::Info };
    log::log!(
        target: HTTP_TARGET,
        level,
        "{method} {uri} {} {:.3} ms [{id}]",
        res.status().as_u16(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    if let Ok(v) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID, v);
    }
    res
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Per-IP request budget for the API.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let decision = state.limiter.check(&client_key(&req));
    let mut res = if decision.allowed {
        next.run(req).await
    } else {
        log::warn!(target: HTTP_TARGET, "rate limit hit by {}", client_key(&req));
        let mut res =
            AppError::RateLimited("Too many requests from this IP, please try again in an hour!".into()).into_response();
        res.headers_mut().insert("retry-after", HeaderValue::from(decision.retry_after_secs));
        res
    };
    let headers = res.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    res
}

/// A conservative subset of the usual hardening headers.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("x-dns-prefetch-control", HeaderValue::from_static("off"));
    res
}
