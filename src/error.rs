use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Field name to list of messages, as rendered in the `errors` member.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Validation failure on a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    /// A UNIQUE violation becomes the same field error the pre-insert check
    /// reports; a concurrent duplicate can slip past that check.
    pub fn unique(field: &'static str, message: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |err| {
            if let rusqlite::Error::SqliteFailure(e, _) = &err {
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                    return AppError::field(field, message);
                }
            }
            AppError::Database(err)
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid ({})", field, e.code),
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        AppError::Validation(fields)
    }
}

impl AppError {
    /// Status, user-facing message and field errors. Server-side failures are
    /// logged here and reported with a generic message.
    pub fn describe(&self) -> (StatusCode, String, Option<FieldErrors>) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthenticated".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "The given data was invalid".to_string(),
                Some(fields.clone()),
            ),
            AppError::InvalidTransition(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                internal()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                internal()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = self.describe();
        let body = match errors {
            Some(errors) => json!({ "success": false, "message": message, "errors": errors }),
            None => json!({ "success": false, "message": message }),
        };

        (status, Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, String, Option<FieldErrors>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
        None,
    )
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(
            response_status(AppError::forbidden("nope")),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn validation_returns_422() {
        assert_eq!(
            response_status(AppError::field("title", "too long")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            response_status(AppError::InvalidTransition("already approved".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violation_becomes_field_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (email TEXT UNIQUE NOT NULL);").unwrap();
        conn.execute("INSERT INTO t VALUES ('a@example.com')", []).unwrap();

        let dup = conn
            .execute("INSERT INTO t VALUES ('a@example.com')", [])
            .map_err(AppError::unique("email", "taken"))
            .unwrap_err();
        assert!(matches!(&dup, AppError::Validation(f) if f["email"] == vec!["taken".to_string()]));

        let other = conn
            .execute("INSERT INTO t VALUES (NULL)", [])
            .map_err(AppError::unique("email", "taken"))
            .unwrap_err();
        assert!(matches!(other, AppError::Database(_)));
    }

    #[derive(Validate)]
    struct Sample {
        #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
        rating: i64,
    }

    #[test]
    fn validator_errors_keep_field_names() {
        let err: AppError = Sample { rating: 9 }.validate().unwrap_err().into();
        match err {
            AppError::Validation(fields) => {
                assert_eq!(
                    fields.get("rating").unwrap(),
                    &vec!["Rating must be between 1 and 5".to_string()]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
