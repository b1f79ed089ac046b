use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::r2d2;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the HTTP layer, rendered as JSON with a stable code.
#[derive(Debug)]
pub enum AppError {
    // Validation Errors
    InvalidInput { field: String, message: String },
    ResourceNotFound { resource: String },

    // Database Errors
    DatabaseError,
    ConnectionPoolError,

    // System Errors
    TemplateError,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidInput { field, message } => write!(f, "Invalid {}: {}", field, message),
            AppError::ResourceNotFound { resource } => write!(f, "{} not found", resource),

            AppError::DatabaseError => write!(f, "A database error occurred - please try again"),
            AppError::ConnectionPoolError => write!(f, "Service temporarily unavailable - please try again"),

            AppError::TemplateError => write!(f, "Unable to render page"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ConnectionPoolError => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError | AppError::TemplateError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_code = match self {
            AppError::InvalidInput { .. } => "INVALID_INPUT",
            AppError::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::DatabaseError => "DATABASE_ERROR",
            AppError::ConnectionPoolError => "CONNECTION_POOL_ERROR",
            AppError::TemplateError => "TEMPLATE_ERROR",
        };

        if self.status_code().is_server_error() {
            log::error!("Server error: {:?}", self);
        } else {
            log::info!("Client error: {:?}", self);
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string()
            }
        }))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid_input(field: &str, message: &str) -> Self {
        AppError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Convert database connection pool errors
impl From<r2d2::PoolError> for AppError {
    fn from(err: r2d2::PoolError) -> Self {
        log::error!("Database connection pool error: {}", err);
        AppError::ConnectionPoolError
    }
}

/// Convert diesel database errors
impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::Error as DieselError;

        match err {
            DieselError::NotFound => AppError::ResourceNotFound {
                resource: "Record".to_string(),
            },
            _ => {
                log::error!("Database error: {}", err);
                AppError::DatabaseError
            }
        }
    }
}

impl From<askama::Error> for AppError {
    fn from(err: askama::Error) -> Self {
        log::error!("Template error: {}", err);
        AppError::TemplateError
    }
}

/// Failures inside one pipeline run. None of these stop the scheduler; they
/// are scoped to a user or a single feed entry and reported through logs.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("feed error: {0}")]
    Feed(String),
    #[error("cover letter generation failed: {0}")]
    Generation(String),
    #[error("email delivery failed: {0}")]
    Notify(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::PoolError),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

impl From<crate::models::user::UserTableError> for PipelineError {
    fn from(err: crate::models::user::UserTableError) -> Self {
        use crate::models::user::UserTableError;

        match err {
            UserTableError::DatabaseError(e) => PipelineError::Database(e),
            UserTableError::UserNotFound(_) => PipelineError::Database(diesel::result::Error::NotFound),
        }
    }
}

/// Runs `fut` with a deadline; an elapsed deadline becomes
/// [`PipelineError::Timeout`] so callers treat it like any other hard failure.
pub async fn with_timeout<T, F>(
    what: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(PipelineError::Timeout { what, after }),
    }
}
