//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body has the shape `{"error": "<message>", "code": "<kind>"}`.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use santa_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No authenticated [`crate::Caller`] on a creator-only route.
  #[error("authentication required")]
  Unauthenticated,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  fn status_and_code(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
      ApiError::Core(e) => match e {
        CoreError::SessionNotFound(_)
        | CoreError::InviteNotFound(_)
        | CoreError::ParticipantNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::Unauthorized(_) => (StatusCode::FORBIDDEN, "forbidden"),
        CoreError::InvalidState { .. } | CoreError::InvalidTransition { .. } => {
          (StatusCode::CONFLICT, "invalid_state")
        }
        CoreError::DuplicateParticipant { .. } => {
          (StatusCode::CONFLICT, "duplicate_participant")
        }
        CoreError::DrawContention(_) => (StatusCode::CONFLICT, "draw_contention"),
        CoreError::InsufficientParticipants(_) => {
          (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_participants")
        }
        CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        CoreError::PlanLimit(_) => (StatusCode::FORBIDDEN, "plan_limit"),
        CoreError::Verification(_) => (StatusCode::BAD_REQUEST, "verification"),
        CoreError::Payment(_) => (StatusCode::BAD_GATEWAY, "payment"),
        CoreError::InviteCodeExhausted | CoreError::Store(_) => {
          (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code) = self.status_and_code();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    let mut res =
      (status, Json(json!({ "error": self.to_string(), "code": code })))
        .into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"santa\""),
      );
    }
    res
  }
}
