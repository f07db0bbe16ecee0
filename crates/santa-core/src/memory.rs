//! In-memory [`SessionStore`] used by the lifecycle tests, with switches to
//! make individual writes fail.

use std::{
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  AccountId,
  assignment::Assignment,
  participant::{Participant, Preferences},
  session::{Session, SessionStatus},
  store::{CommitOutcome, JoinOutcome, RemoveOutcome, SessionStore},
};

#[derive(Debug, Error)]
#[error("injected failure: {0}")]
pub struct MemoryError(&'static str);

#[derive(Default)]
struct Inner {
  sessions:         HashMap<Uuid, Session>,
  /// Participants in join order.
  participants:     Vec<Participant>,
  fail_commits:     bool,
  fail_transitions: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Make every `commit_assignments` call fail.
  pub fn fail_commits(&self, fail: bool) { self.lock().fail_commits = fail; }

  /// Make `transition_status` fail for one session.
  pub fn fail_transitions_for(&self, session_id: Uuid) {
    self.lock().fail_transitions.insert(session_id);
  }

  /// Overwrite a stored session, bypassing every guard.
  pub fn put_session(&self, session: Session) {
    self.lock().sessions.insert(session.session_id, session);
  }
}

impl SessionStore for MemoryStore {
  type Error = MemoryError;

  async fn insert_session(&self, session: Session) -> Result<(), MemoryError> {
    let mut inner = self.lock();
    if inner.sessions.contains_key(&session.session_id)
      || inner
        .sessions
        .values()
        .any(|s| s.invite_code == session.invite_code)
    {
      return Err(MemoryError("duplicate session"));
    }
    inner.sessions.insert(session.session_id, session);
    Ok(())
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<Session>, MemoryError> {
    Ok(self.lock().sessions.get(&id).cloned())
  }

  async fn find_session_by_invite_code<'a>(
    &'a self,
    code: &'a str,
  ) -> Result<Option<Session>, MemoryError> {
    Ok(
      self
        .lock()
        .sessions
        .values()
        .find(|s| s.invite_code == code)
        .cloned(),
    )
  }

  async fn list_sessions_by_creator(
    &self,
    creator: AccountId,
  ) -> Result<Vec<Session>, MemoryError> {
    let mut sessions: Vec<Session> = self
      .lock()
      .sessions
      .values()
      .filter(|s| s.creator_id == creator)
      .cloned()
      .collect();
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(sessions)
  }

  async fn list_sessions_by_status(
    &self,
    status: SessionStatus,
  ) -> Result<Vec<Session>, MemoryError> {
    Ok(
      self
        .lock()
        .sessions
        .values()
        .filter(|s| s.status == status)
        .cloned()
        .collect(),
    )
  }

  async fn count_active_sessions(
    &self,
    creator: AccountId,
  ) -> Result<u32, MemoryError> {
    Ok(
      self
        .lock()
        .sessions
        .values()
        .filter(|s| s.creator_id == creator && s.status.is_active())
        .count() as u32,
    )
  }

  async fn update_session_details(
    &self,
    session: Session,
  ) -> Result<bool, MemoryError> {
    let mut inner = self.lock();
    let Some(stored) = inner.sessions.get_mut(&session.session_id) else {
      return Ok(false);
    };
    stored.name = session.name;
    stored.budget = session.budget;
    stored.registration_deadline = session.registration_deadline;
    stored.gift_exchange_date = session.gift_exchange_date;
    stored.timezone = session.timezone;
    Ok(true)
  }

  async fn set_payment_reference(
    &self,
    id: Uuid,
    reference: String,
  ) -> Result<bool, MemoryError> {
    let mut inner = self.lock();
    match inner.sessions.get_mut(&id) {
      Some(stored) if stored.status == SessionStatus::PendingPayment => {
        stored.payment_reference = Some(reference);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn transition_status(
    &self,
    id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
    at: DateTime<Utc>,
  ) -> Result<bool, MemoryError> {
    let mut inner = self.lock();
    if inner.fail_transitions.contains(&id) {
      return Err(MemoryError("transition"));
    }
    match inner.sessions.get_mut(&id) {
      Some(s) if s.status == from => {
        s.status = to;
        if to == SessionStatus::Completed {
          s.completed_at = Some(at);
        }
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn delete_session(&self, id: Uuid) -> Result<bool, MemoryError> {
    let mut inner = self.lock();
    let existed = inner.sessions.remove(&id).is_some();
    inner.participants.retain(|p| p.session_id != id);
    Ok(existed)
  }

  async fn insert_participant(
    &self,
    participant: Participant,
  ) -> Result<JoinOutcome, MemoryError> {
    let mut inner = self.lock();
    let Some(session) = inner.sessions.get(&participant.session_id) else {
      return Ok(JoinOutcome::SessionMissing);
    };
    if session.status != SessionStatus::Open {
      return Ok(JoinOutcome::NotJoinable(session.status));
    }
    let plan = session.plan;

    let members: Vec<&Participant> = inner
      .participants
      .iter()
      .filter(|p| p.session_id == participant.session_id)
      .collect();
    if members.iter().any(|p| p.email == participant.email) {
      return Ok(JoinOutcome::DuplicateEmail);
    }
    if let Err(limit) = plan.check_participant_capacity(members.len()) {
      return Ok(JoinOutcome::LimitReached(limit));
    }

    inner.participants.push(participant);
    Ok(JoinOutcome::Joined)
  }

  async fn get_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<Option<Participant>, MemoryError> {
    Ok(
      self
        .lock()
        .participants
        .iter()
        .find(|p| {
          p.session_id == session_id && p.participant_id == participant_id
        })
        .cloned(),
    )
  }

  async fn list_participants(
    &self,
    session_id: Uuid,
  ) -> Result<Vec<Participant>, MemoryError> {
    Ok(
      self
        .lock()
        .participants
        .iter()
        .filter(|p| p.session_id == session_id)
        .cloned()
        .collect(),
    )
  }

  async fn update_preferences(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
    preferences: Preferences,
  ) -> Result<Option<Participant>, MemoryError> {
    let mut inner = self.lock();
    Ok(
      inner
        .participants
        .iter_mut()
        .find(|p| {
          p.session_id == session_id && p.participant_id == participant_id
        })
        .map(|p| {
          p.preferences = Some(preferences);
          p.clone()
        }),
    )
  }

  async fn delete_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<RemoveOutcome, MemoryError> {
    let mut inner = self.lock();
    if inner
      .sessions
      .get(&session_id)
      .is_some_and(Session::has_assignments)
    {
      return Ok(RemoveOutcome::AlreadyAssigned);
    }
    let before = inner.participants.len();
    inner.participants.retain(|p| {
      !(p.session_id == session_id && p.participant_id == participant_id)
    });
    Ok(if inner.participants.len() < before {
      RemoveOutcome::Removed
    } else {
      RemoveOutcome::NotFound
    })
  }

  async fn commit_assignments(
    &self,
    session_id: Uuid,
    assignments: Vec<Assignment>,
    at: DateTime<Utc>,
  ) -> Result<CommitOutcome, MemoryError> {
    let mut inner = self.lock();
    if inner.fail_commits {
      return Err(MemoryError("commit"));
    }
    let Some(session) = inner.sessions.get(&session_id) else {
      return Ok(CommitOutcome::SessionMissing);
    };
    if !session.accepts_draw() {
      return Ok(CommitOutcome::Rejected(session.status));
    }

    let current: HashSet<Uuid> = inner
      .participants
      .iter()
      .filter(|p| p.session_id == session_id)
      .map(|p| p.participant_id)
      .collect();
    let givers: HashSet<Uuid> = assignments.iter().map(|a| a.giver_id).collect();
    if current != givers || givers.len() != assignments.len() {
      return Ok(CommitOutcome::ParticipantsChanged);
    }

    for a in &assignments {
      if let Some(p) = inner
        .participants
        .iter_mut()
        .find(|p| p.participant_id == a.giver_id)
      {
        p.assigned_to = Some(a.recipient_id);
      }
    }
    let Some(session) = inner.sessions.get_mut(&session_id) else {
      return Ok(CommitOutcome::SessionMissing);
    };
    session.status = SessionStatus::Locked;
    session.assigned_at = Some(at);
    Ok(CommitOutcome::Committed(session.clone()))
  }
}
