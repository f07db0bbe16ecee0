//! The authenticated account behind a request.

use axum::{extract::FromRequestParts, http::request::Parts};
use santa_core::AccountId;

use crate::error::ApiError;

/// Inserted into request extensions by the authentication layer. Handlers
/// that act on a creator's behalf take it as an extractor; a request without
/// one is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub AccountId);

impl<St: Send + Sync> FromRequestParts<St> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &St,
  ) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Caller>()
      .copied()
      .ok_or(ApiError::Unauthenticated)
  }
}
