//! `GET /invite/{code}`: what a prospective participant sees before joining.

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use santa_core::{
  notify::Notifier,
  payment::PaymentGateway,
  plan::Plan,
  session::{Session, SessionStatus},
  store::SessionStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// The public face of a session. Creator and payment details are left out.
#[derive(Debug, Serialize, Deserialize)]
pub struct InviteView {
  pub session_id:            Uuid,
  pub name:                  String,
  pub plan:                  Plan,
  pub status:                SessionStatus,
  pub registration_deadline: NaiveDateTime,
  pub gift_exchange_date:    NaiveDateTime,
  pub timezone:              Tz,
  pub budget:                Option<f64>,
}

impl From<Session> for InviteView {
  fn from(s: Session) -> Self {
    Self {
      session_id:            s.session_id,
      name:                  s.name,
      plan:                  s.plan,
      status:                s.status,
      registration_deadline: s.registration_deadline,
      gift_exchange_date:    s.gift_exchange_date,
      timezone:              s.timezone,
      budget:                s.budget,
    }
  }
}

/// `GET /invite/{code}`
pub async fn lookup<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  Path(code): Path<String>,
) -> Result<Json<InviteView>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let session = state.lifecycle.get_session_by_invite_code(&code).await?;
  Ok(Json(session.into()))
}
