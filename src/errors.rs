use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),

    #[error("Invalid {path}: {value}.")]
    Cast { path: String, value: String },

    #[error("Duplicate field value: {value}. Please use another value!")]
    DuplicateKey { fields: Vec<String>, value: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Expected server-side failure (500) whose message is safe to show.
    #[error("{0}")]
    Operational(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("No {what} found with that ID"))
    }

    pub fn cast(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cast { path: path.into(), value: value.into() }
    }

    /// HTTP status the error maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Cast { .. } | Self::DuplicateKey { .. } => 400,
            Self::BadRequest(_) => 400,
            Self::Auth(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::PayloadTooLarge(_) => 413,
            Self::RateLimited(_) => 429,
            Self::Operational(_)
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Bson(_)
            | Self::Config(_) => 500,
        }
    }

    /// `"fail"` for client errors, `"error"` otherwise.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        if self.status_code() < 500 { "fail" } else { "error" }
    }

    /// Operational errors are expected failures whose message is safe to show a client.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(
            self,
            Self::Internal(_) | Self::Io(_) | Self::Json(_) | Self::Bson(_) | Self::Config(_)
        )
    }

    /// Variant name, surfaced as `error.name` in development responses.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Cast { .. } => "CastError",
            Self::DuplicateKey { .. } => "DuplicateKeyError",
            Self::NotFound(_) => "NotFoundError",
            Self::BadRequest(_) => "BadRequestError",
            Self::Auth(_) => "AuthError",
            Self::Forbidden(_) => "ForbiddenError",
            Self::RateLimited(_) => "RateLimitError",
            Self::PayloadTooLarge(_) => "PayloadTooLargeError",
            Self::Operational(_) => "OperationalError",
            Self::Internal(_) => "InternalError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Bson(_) => "BsonError",
            Self::Config(_) => "ConfigError",
        }
    }
}
