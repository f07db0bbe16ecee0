//! The `SessionStore` trait and the outcomes of its conditional writes.
//!
//! The trait is implemented by storage backends (e.g. `santa-store-sqlite`).
//! The lifecycle and the scheduler depend on this abstraction only.
//!
//! Every write whose correctness depends on the current state of a session
//! (status flips, joins near the participant cap, drawing assignments) is a
//! single conditional operation here, so two concurrent callers can never
//! both succeed on a check that only one of them should pass.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  AccountId,
  assignment::Assignment,
  participant::{Participant, Preferences},
  plan::PlanLimitError,
  session::{Session, SessionStatus},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`SessionStore::insert_participant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
  Joined,
  SessionMissing,
  /// The session is not `Open` at write time.
  NotJoinable(SessionStatus),
  /// The session's plan admits no further participants.
  LimitReached(PlanLimitError),
  DuplicateEmail,
}

/// Result of [`SessionStore::delete_participant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
  Removed,
  NotFound,
  /// Assignments were drawn; the participant set is frozen.
  AlreadyAssigned,
}

/// Result of [`SessionStore::commit_assignments`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
  /// All assignments were written and the session is now `Locked`.
  Committed(Session),
  SessionMissing,
  /// The session no longer accepts a draw; carries its current status.
  Rejected(SessionStatus),
  /// Participants joined or left since the draw was computed.
  ParticipantsChanged,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a session/participant store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Persist a new session. Fails if the id or invite code is taken.
  fn insert_session(
    &self,
    session: Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  fn find_session_by_invite_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  /// Sessions created by `creator`, newest first.
  fn list_sessions_by_creator(
    &self,
    creator: AccountId,
  ) -> impl Future<Output = Result<Vec<Session>, Self::Error>> + Send + '_;

  fn list_sessions_by_status(
    &self,
    status: SessionStatus,
  ) -> impl Future<Output = Result<Vec<Session>, Self::Error>> + Send + '_;

  /// Number of `creator`'s sessions in an active status
  /// (see [`SessionStatus::is_active`]).
  fn count_active_sessions(
    &self,
    creator: AccountId,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  /// Overwrite the editable details of a session: name, budget, deadlines
  /// and timezone. Status, payment reference and timestamps are untouched.
  /// Returns `false` if the session does not exist.
  fn update_session_details(
    &self,
    session: Session,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record the gateway reference of a session awaiting payment, touching
  /// nothing else. Returns `false` if the session is missing or no longer
  /// `PendingPayment`.
  fn set_payment_reference(
    &self,
    id: Uuid,
    reference: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Compare-and-swap the status from `from` to `to`.
  ///
  /// Moving to `Completed` stamps `completed_at = at`. Returns `false`
  /// without writing if the session is missing or its status is not `from`.
  fn transition_status(
    &self,
    id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete a session and, in the same write, all of its participants.
  /// Returns `false` if it did not exist.
  fn delete_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Participants ──────────────────────────────────────────────────────

  /// Insert a participant if, at write time, its session is `Open`, has room
  /// under its plan ([`crate::plan::Plan::check_participant_capacity`]) and
  /// has nobody with the same email.
  fn insert_participant(
    &self,
    participant: Participant,
  ) -> impl Future<Output = Result<JoinOutcome, Self::Error>> + Send + '_;

  /// A participant of `session_id`. A participant of any other session is
  /// reported as `None`.
  fn get_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> impl Future<Output = Result<Option<Participant>, Self::Error>> + Send + '_;

  /// Participants of a session in join order.
  fn list_participants(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Participant>, Self::Error>> + Send + '_;

  fn update_preferences(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
    preferences: Preferences,
  ) -> impl Future<Output = Result<Option<Participant>, Self::Error>> + Send + '_;

  /// Remove a participant unless assignments were already drawn for its
  /// session.
  fn delete_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> impl Future<Output = Result<RemoveOutcome, Self::Error>> + Send + '_;

  // ── Assignments ───────────────────────────────────────────────────────

  /// Atomically record a draw.
  ///
  /// In one transaction: check the session still accepts a draw
  /// ([`Session::accepts_draw`]), check its participant set is exactly the
  /// set of givers in `assignments`, write every `assigned_to`, set the
  /// status to `Locked` and stamp `assigned_at = at`. Nothing is written
  /// unless every check passes.
  fn commit_assignments(
    &self,
    session_id: Uuid,
    assignments: Vec<Assignment>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;
}
