//! Request extractors.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the id of the authenticated user.
///
/// Session handling happens in front of this service; it only trusts the
/// header it is handed.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;

        UserId::from_str(value.trim())
            .map(CurrentUser)
            .map_err(|_| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))
    }
}

/// Parses an id from a path segment.
pub fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {raw}")))
}
