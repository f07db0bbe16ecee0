//! Handlers for `/sessions` endpoints. All of them act on behalf of the
//! session creator and require a [`Caller`].
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/sessions` | The caller's sessions, newest first |
//! | `POST`   | `/sessions` | Body: [`NewSession`] |
//! | `GET`    | `/sessions/{id}` | |
//! | `PATCH`  | `/sessions/{id}` | Body: [`SessionChanges`] |
//! | `DELETE` | `/sessions/{id}` | Removes participants too |
//! | `PATCH`  | `/sessions/{id}/status` | Body: `{"status":"locked"}` |
//! | `POST`   | `/sessions/{id}/assignments` | Draw, lock and notify |
//! | `POST`   | `/sessions/{id}/checkout` | Paid plans only |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use santa_core::{
  assignment::AssignmentOutcome,
  notify::Notifier,
  payment::{CheckoutHandle, PaymentGateway},
  session::{NewSession, Session, SessionChanges, SessionStatus},
  store::SessionStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, Caller, error::ApiError};

// ─── List / create ───────────────────────────────────────────────────────────

/// `GET /sessions`
pub async fn list<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
) -> Result<Json<Vec<Session>>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(state.lifecycle.list_sessions(caller).await?))
}

/// `POST /sessions`
pub async fn create<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Json(body): Json<NewSession>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let session = state.lifecycle.create_session(caller, body).await?;
  Ok((StatusCode::CREATED, Json(session)))
}

// ─── Single session ──────────────────────────────────────────────────────────

/// `GET /sessions/{id}`
pub async fn get_one<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(state.lifecycle.get_session(id, caller).await?))
}

/// `PATCH /sessions/{id}`
pub async fn update<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
  Json(changes): Json<SessionChanges>,
) -> Result<Json<Session>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(state.lifecycle.update_session(id, caller, changes).await?))
}

/// `DELETE /sessions/{id}`
pub async fn delete<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  state.lifecycle.delete_session(id, caller).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: SessionStatus,
}

/// `PATCH /sessions/{id}/status`
pub async fn update_status<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<Session>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(state.lifecycle.update_status(id, caller, body.status).await?))
}

// ─── Assignments ─────────────────────────────────────────────────────────────

/// What the creator learns about a draw. Who gives to whom stays secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentSummary {
  pub session:      Session,
  pub participants: usize,
  pub notified:     usize,
  /// Set when some assignment emails could not be sent.
  pub warning:      Option<String>,
  pub failed:       Vec<String>,
}

impl From<AssignmentOutcome> for AssignmentSummary {
  fn from(outcome: AssignmentOutcome) -> Self {
    let (warning, failed) = match outcome.partial_failure {
      Some(report) => (
        Some(report.to_string()),
        report.failures.into_iter().map(|f| f.email).collect(),
      ),
      None => (None, Vec::new()),
    };
    Self {
      session: outcome.session,
      participants: outcome.assignments.len(),
      notified: outcome.notified,
      warning,
      failed,
    }
  }
}

/// `POST /sessions/{id}/assignments`
pub async fn assign<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<AssignmentSummary>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let outcome = state.lifecycle.lock_and_assign(id, caller).await?;
  Ok(Json(outcome.into()))
}

// ─── Checkout ────────────────────────────────────────────────────────────────

/// `POST /sessions/{id}/checkout`
pub async fn checkout<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<CheckoutHandle>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let handle = state
    .lifecycle
    .begin_checkout(state.gateway.as_ref(), id, caller)
    .await?;
  Ok(Json(handle))
}
