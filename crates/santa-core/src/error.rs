//! Error types for `santa-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  payment::VerificationError, plan::PlanLimitError, session::SessionStatus,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("no session uses invite code {0:?}")]
  InviteNotFound(String),

  /// Also returned when the participant exists but belongs to another session.
  #[error("participant not found: {0}")]
  ParticipantNotFound(Uuid),

  #[error("only the session creator may {0}")]
  Unauthorized(&'static str),

  #[error("cannot {action} a session that is {status}")]
  InvalidState {
    status: SessionStatus,
    action: &'static str,
  },

  #[error("cannot move a session from {from} to {to}")]
  InvalidTransition {
    from: SessionStatus,
    to:   SessionStatus,
  },

  #[error("at least 2 participants are needed to draw assignments, found {0}")]
  InsufficientParticipants(usize),

  #[error(transparent)]
  PlanLimit(#[from] PlanLimitError),

  #[error("{email} has already joined this session")]
  DuplicateParticipant { email: String },

  #[error("invalid input: {0}")]
  Validation(String),

  #[error(transparent)]
  Verification(#[from] VerificationError),

  #[error("payment gateway error: {0}")]
  Payment(String),

  #[error("could not allocate a unique invite code")]
  InviteCodeExhausted,

  #[error("participants of session {0} kept changing while drawing assignments")]
  DrawContention(Uuid),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error from a [`crate::store::SessionStore`].
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
