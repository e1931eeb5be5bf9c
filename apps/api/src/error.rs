//! # API Errors
//!
//! Every failure leaves the server as `{"error": <code>, "message": <text>}`.
//!
//! ## Status Mapping
//! ```text
//! ┌──────────────────────────────────────┬────────┬─────────────────────┐
//! │ Source                               │ Status │ error               │
//! ├──────────────────────────────────────┼────────┼─────────────────────┤
//! │ ValidationError, bad JSON / query    │  400   │ validation_error    │
//! │ missing / invalid bearer token       │  401   │ unauthorized        │
//! │ role lacks privilege                 │  403   │ forbidden           │
//! │ DbError::NotFound                    │  404   │ not_found           │
//! │ UniqueViolation, Conflict, Busy      │  409   │ conflict            │
//! │ Protected (RESTRICT on delete)       │  409   │ protected           │
//! │ InsufficientStock                    │  422   │ insufficient_stock  │
//! │ InvalidTransition                    │  422   │ invalid_transition  │
//! │ other business rules, CHECK, FK      │  422   │ see ErrorCode       │
//! │ anything else                        │  500   │ internal_error      │
//! └──────────────────────────────────────┴────────┴─────────────────────┘
//! ```

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pharma_core::{CoreError, ValidationError};
use pharma_db::DbError;
use serde_json::json;
use tracing::error;

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Protected,
    InsufficientStock,
    InvalidTransition,
    StockInvariant,
    EmptyCart,
    CartTooLarge,
    NotStocked,
    WrongCompanyKind,
    InvalidReference,
    ConstraintViolation,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation_error",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Protected => "protected",
            ErrorCode::InsufficientStock => "insufficient_stock",
            ErrorCode::InvalidTransition => "invalid_transition",
            ErrorCode::StockInvariant => "stock_invariant",
            ErrorCode::EmptyCart => "empty_cart",
            ErrorCode::CartTooLarge => "cart_too_large",
            ErrorCode::NotStocked => "not_stocked",
            ErrorCode::WrongCompanyKind => "wrong_company_kind",
            ErrorCode::InvalidReference => "invalid_reference",
            ErrorCode::ConstraintViolation => "constraint_violation",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::Protected => StatusCode::CONFLICT,
            ErrorCode::InsufficientStock
            | ErrorCode::InvalidTransition
            | ErrorCode::StockInvariant
            | ErrorCode::EmptyCart
            | ErrorCode::CartTooLarge
            | ErrorCode::NotStocked
            | ErrorCode::WrongCompanyKind
            | ErrorCode::InvalidReference
            | ErrorCode::ConstraintViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API errors.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(code = self.code.as_str(), error = %self.message, "Request failed");
            // Internal details stay in the log.
            match self.code {
                ErrorCode::Unavailable => self.message,
                _ => "internal server error".to_string(),
            }
        } else {
            self.message
        };

        (
            status,
            Json(json!({
                "error": self.code.as_str(),
                "message": message,
            })),
        )
            .into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::StockInvariant(_) => ErrorCode::StockInvariant,
            CoreError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            CoreError::EmptyCart => ErrorCode::EmptyCart,
            CoreError::CartTooLarge { .. } => ErrorCode::CartTooLarge,
            CoreError::NotStocked { .. } => ErrorCode::NotStocked,
            CoreError::WrongCompanyKind { .. } => ErrorCode::WrongCompanyKind,
            CoreError::Validation(v) => return ApiError::from(v.clone()),
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        let code = match &err {
            DbError::NotFound { .. } => ErrorCode::NotFound,
            DbError::UniqueViolation { .. } | DbError::Conflict(_) | DbError::Busy => {
                ErrorCode::Conflict
            }
            DbError::Protected { .. } => ErrorCode::Protected,
            DbError::ForeignKeyViolation { .. } => ErrorCode::InvalidReference,
            DbError::CheckViolation(_) => ErrorCode::ConstraintViolation,
            DbError::Core(core) => return ApiError::from(core.clone()),
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::PoolExhausted
            | DbError::Internal(_) => ErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_status() {
        let cases = [
            (DbError::not_found("Order", "o-1"), StatusCode::NOT_FOUND),
            (
                DbError::UniqueViolation {
                    field: "manufacturers.name".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                DbError::Protected {
                    entity: "Manufacturer".to_string(),
                    id: "m-1".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (DbError::Busy, StatusCode::CONFLICT),
            (
                DbError::CheckViolation("CHECK constraint failed".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DbError::PoolExhausted, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_core_errors_keep_their_code() {
        let err = ApiError::from(DbError::Core(CoreError::InsufficientStock {
            variant_id: "v-1".to_string(),
            available: 1,
            requested: 2,
        }));
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::from(DbError::from(ValidationError::required("name")));
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.message, "name is required");

        let err = ApiError::from(CoreError::transition("Order", "shipped", "cancelled"));
        assert_eq!(err.code.as_str(), "invalid_transition");
    }

    #[test]
    fn test_internal_message_hidden() {
        let response = ApiError::internal("disk on fire").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
