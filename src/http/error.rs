//! Error responses.
//!
//! Every `AppError` renders the production envelope `{status, message}` and
//! stashes an [`ErrorDetail`] in the response extensions. In development the
//! [`error_envelope`] middleware swaps the body for
//! `{status, error, message, stack}` built from that detail.

use crate::errors::AppError;
use crate::http::AppState;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

const GENERIC_MESSAGE: &str = "Something went wrong!";

/// Raw error facts, kept for the development envelope.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub status_code: u16,
    pub status: &'static str,
    pub message: String,
    pub stack: Vec<String>,
}

impl ErrorDetail {
    fn of(err: &AppError) -> Self {
        let mut stack = vec![format!("{}: {err}", err.kind())];
        let mut source = std::error::Error::source(err);
        while let Some(s) = source {
            stack.push(format!("caused by: {s}"));
            source = s.source();
        }
        Self {
            kind: err.kind(),
            status_code: err.status_code(),
            status: err.status(),
            message: err.to_string(),
            stack,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.is_operational() {
            self.to_string()
        } else {
            log::error!("ERROR 💥 {self}");
            GENERIC_MESSAGE.to_string()
        };
        let mut res = (code, Json(json!({ "status": self.status(), "message": message }))).into_response();
        res.extensions_mut().insert(ErrorDetail::of(&self));
        res
    }
}

/// Rewrites error bodies with full detail outside production.
pub async fn error_envelope(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    if state.config.env.is_production() {
        return res;
    }
    let Some(detail) = res.extensions().get::<ErrorDetail>().cloned() else {
        return res;
    };
    let (mut parts, _) = res.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = json!({
        "status": detail.status,
        "error": { "name": detail.kind, "statusCode": detail.status_code, "status": detail.status },
        "message": detail.message,
        "stack": detail.stack.join("\n"),
    });
    let fresh = Json(body).into_response();
    Response::from_parts(parts, fresh.into_body())
}
