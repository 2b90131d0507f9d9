use std::collections::HashMap;
use std::convert::Infallible;

use serde_json::json;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::{Reject, Rejection};
use warp::reply::{self, WithStatus};

/// Error taxonomy for every action in this crate.
///
/// `Validation` carries a field-to-message map so the HTTP layer can hand the
/// caller a structured body instead of a single opaque string. All validation
/// is performed before any write starts; `Conflict` only appears when a
/// concurrent request races past the application-level checks and trips a
/// storage uniqueness constraint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed")]
    Validation(HashMap<String, String>),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Query(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn validation(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Reject for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            sqlx::Error::Database(e) => {
                // 23505 = unique_violation
                if e.code().as_deref() == Some("23505") {
                    Self::Conflict(format!("{e}"))
                } else {
                    Self::Query(format!("{e}"))
                }
            }
            sqlx::Error::Configuration(e) => Self::Query(format!("{e}")),
            sqlx::Error::Io(e) => Self::Query(format!("{e}")),
            sqlx::Error::Tls(e) => Self::Query(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::Query(format!("{e}")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::Query(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::Query(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::Query(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::Query(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::Query(format!("{e}")),
            sqlx::Error::AnyDriverError(e) => Self::Query(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::Query(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::Query(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::Query(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::Query(format!("{e}")),
            _ => Self::Query(String::from("Unknown error")),
        }
    }
}

/// Recover handler for warp: turns an [`ApiError`] rejection into a JSON
/// reply. Validation errors serialize as their field map, everything else as
/// `{"detail": ...}`.
pub async fn handle_rejection(err: Rejection) -> Result<WithStatus<reply::Json>, Infallible> {
    if let Some(api) = err.find::<ApiError>() {
        let status = api.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("internal error: {api}");
        }
        let body = match api {
            ApiError::Validation(errors) => reply::json(errors),
            other => reply::json(&json!({ "detail": other.to_string() })),
        };
        return Ok(reply::with_status(body, status));
    }

    if err.is_not_found() {
        return Ok(reply::with_status(
            reply::json(&json!({ "detail": "Page not found" })),
            StatusCode::NOT_FOUND,
        ));
    }

    log::error!("unhandled rejection: {err:?}");
    Ok(reply::with_status(
        reply::json(&json!({ "detail": "Internal server error" })),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_carries_field_map() {
        let err = ApiError::validation("cooking_time", "Must be at least 1");
        match &err {
            ApiError::Validation(map) => {
                assert_eq!(map.get("cooking_time").map(String::as_str), Some("Must be at least 1"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::not_found("recipe").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict(String::new()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Unauthenticated(String::new()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Unauthorized(String::new()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Query(String::new()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ApiError converts to a Rejection through warp's Reject blanket impl.
    #[test]
    fn rejection_carries_the_original_error() {
        let rejection = Rejection::from(ApiError::not_found("recipe"));
        let found = rejection.find::<ApiError>();
        assert!(matches!(found, Some(ApiError::NotFound(_))));
    }
}
