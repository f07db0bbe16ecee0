//! Handlers for `/sessions/{id}/participants` endpoints.
//!
//! Joining, viewing one's own dashboard and editing preferences are public:
//! the session and participant ids act as the capability. Listing and
//! removing participants are creator-only.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/sessions/{id}/participants` | Creator only, without assignments |
//! | `POST`   | `/sessions/{id}/participants` | Body: `{"name":…,"email":…}` |
//! | `GET`    | `/sessions/{id}/participants/{pid}` | Own record and recipient |
//! | `DELETE` | `/sessions/{id}/participants/{pid}` | Creator only, before the draw |
//! | `PATCH`  | `/sessions/{id}/participants/{pid}/preferences` | Body: [`Preferences`] |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use santa_core::{
  notify::Notifier,
  participant::{NewParticipant, Participant, ParticipantView, Preferences},
  payment::PaymentGateway,
  store::SessionStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, Caller, error::ApiError};

/// A participant as the creator sees them. Who they give to is left out.
#[derive(Debug, Serialize, Deserialize)]
pub struct RosterEntry {
  pub participant_id: Uuid,
  pub name:           String,
  pub email:          String,
  pub preferences:    Option<Preferences>,
  pub assigned:       bool,
  pub joined_at:      DateTime<Utc>,
}

impl From<Participant> for RosterEntry {
  fn from(p: Participant) -> Self {
    Self {
      participant_id: p.participant_id,
      name:           p.name,
      email:          p.email,
      preferences:    p.preferences,
      assigned:       p.assigned_to.is_some(),
      joined_at:      p.joined_at,
    }
  }
}

/// `GET /sessions/{id}/participants`
pub async fn list<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<RosterEntry>>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let participants = state.lifecycle.list_participants(id, caller).await?;
  Ok(Json(participants.into_iter().map(RosterEntry::from).collect()))
}

/// `POST /sessions/{id}/participants`
pub async fn join<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewParticipant>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let participant = state.lifecycle.join_session(id, body).await?;
  Ok((StatusCode::CREATED, Json(participant)))
}

/// `GET /sessions/{id}/participants/{pid}`
pub async fn view<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Path((id, pid)): Path<(Uuid, Uuid)>,
) -> Result<Json<ParticipantView>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(state.lifecycle.participant_view(id, pid).await?))
}

/// `DELETE /sessions/{id}/participants/{pid}`
pub async fn remove<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Caller(caller): Caller,
  Path((id, pid)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  state.lifecycle.remove_participant(id, pid, caller).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /sessions/{id}/participants/{pid}/preferences`
pub async fn update_preferences<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Path((id, pid)): Path<(Uuid, Uuid)>,
  Json(preferences): Json<Preferences>,
) -> Result<Json<Participant>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  Ok(Json(
    state.lifecycle.update_preferences(id, pid, preferences).await?,
  ))
}
