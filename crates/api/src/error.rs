//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path, query or body.
    BadRequest(String),
    /// The caller did not identify themselves.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Domain(err) => (domain_status(err), err.kind()),
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::EmptyCart => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } | DomainError::UnknownPayment(_) => StatusCode::NOT_FOUND,
        DomainError::InsufficientStock { .. }
        | DomainError::InvalidTransition { .. }
        | DomainError::ConflictingPaymentState { .. }
        | DomainError::AmountMismatch { .. }
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::ProductUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) => msg,
            ApiError::Domain(err) => err.to_string(),
        };

        metrics::counter!("api_errors_total", "kind" => kind).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, kind, "request failed");
        }

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}
