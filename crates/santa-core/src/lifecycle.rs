//! The session state machine.
//!
//! [`Lifecycle`] is the only place that decides whether a caller may move a
//! session or its participants from one state to another. Every guard runs
//! before any write, and every write that depends on the state it guarded is
//! a conditional store operation, so a losing racer sees an error instead of
//! a half-applied change.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  AccountId, Error, Result,
  assignment::{self, AssignmentOutcome},
  clock::{Clock, SystemClock},
  notify::Notifier,
  participant::{
    NewParticipant, Participant, ParticipantView, Preferences, RecipientView,
  },
  payment::{CheckoutHandle, PaymentEvent, PaymentGateway, VerificationError},
  scheduler::{Scheduler, SweepReport},
  session::{
    NewSession, Session, SessionChanges, SessionStatus, generate_invite_code,
  },
  store::{CommitOutcome, JoinOutcome, RemoveOutcome, SessionStore},
};

/// How often a draw is recomputed when participants change underneath it.
const MAX_DRAW_ATTEMPTS: usize = 3;
/// How many fresh invite codes to try before giving up.
const MAX_INVITE_ATTEMPTS: usize = 5;

pub struct Lifecycle<S, N> {
  store:    Arc<S>,
  notifier: Arc<N>,
  clock:    Arc<dyn Clock>,
  rng:      Mutex<ChaCha8Rng>,
}

impl<S, N> Lifecycle<S, N>
where
  S: SessionStore,
  N: Notifier,
{
  /// A lifecycle on the system clock with an entropy-seeded RNG.
  pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
    Self {
      store,
      notifier,
      clock: Arc::new(SystemClock),
      rng: Mutex::new(ChaCha8Rng::from_entropy()),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Make draws and invite codes reproducible.
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = Mutex::new(ChaCha8Rng::seed_from_u64(seed));
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn clock(&self) -> &Arc<dyn Clock> { &self.clock }

  /// A scheduler sharing this lifecycle's store and clock.
  pub fn scheduler(&self) -> Scheduler<S> {
    Scheduler::new(self.store.clone(), self.clock.clone())
  }

  /// Run one deadline sweep immediately.
  pub async fn run_scheduled_sweep(&self) -> SweepReport {
    self.scheduler().sweep().await
  }

  // ─── Sessions ──────────────────────────────────────────────────────────

  pub async fn create_session(
    &self,
    creator: AccountId,
    input: NewSession,
  ) -> Result<Session> {
    let now = self.clock.now();
    input.validate(now)?;

    let active = self
      .store
      .count_active_sessions(creator)
      .await
      .map_err(Error::store)?;
    input.plan.check_active_sessions(active)?;

    let invite_code = self.unused_invite_code().await?;
    let status = if input.plan.requires_payment() {
      SessionStatus::PendingPayment
    } else {
      SessionStatus::Open
    };

    let session = Session {
      session_id: Uuid::new_v4(),
      invite_code,
      name: input.name.trim().to_owned(),
      creator_id: creator,
      plan: input.plan,
      status,
      registration_deadline: input.registration_deadline,
      gift_exchange_date: input.gift_exchange_date,
      timezone: input.timezone,
      budget: input.budget,
      payment_reference: None,
      assigned_at: None,
      completed_at: None,
      created_at: now,
    };
    self
      .store
      .insert_session(session.clone())
      .await
      .map_err(Error::store)?;

    info!(
      session = %session.session_id,
      plan = %session.plan,
      status = session.status.as_str(),
      "created session"
    );
    Ok(session)
  }

  pub async fn get_session(&self, id: Uuid, caller: AccountId) -> Result<Session> {
    self.load_owned(id, caller, "view this session").await
  }

  /// Look a session up by the code participants were given. Sessions that
  /// cannot be joined or viewed by participants are reported as such.
  pub async fn get_session_by_invite_code(&self, code: &str) -> Result<Session> {
    let code = code.trim().to_ascii_uppercase();
    let session = self
      .store
      .find_session_by_invite_code(&code)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::InviteNotFound(code.clone()))?;

    match session.status {
      SessionStatus::Open | SessionStatus::Locked => Ok(session),
      status => Err(Error::InvalidState { status, action: "look up" }),
    }
  }

  pub async fn list_sessions(&self, caller: AccountId) -> Result<Vec<Session>> {
    self
      .store
      .list_sessions_by_creator(caller)
      .await
      .map_err(Error::store)
  }

  /// Edit a session's details. Not allowed once assignments exist or the
  /// session has ended.
  pub async fn update_session(
    &self,
    id: Uuid,
    caller: AccountId,
    changes: SessionChanges,
  ) -> Result<Session> {
    let mut session = self.load_owned(id, caller, "edit this session").await?;
    if session.has_assignments() || session.status.is_terminal() {
      return Err(Error::InvalidState {
        status: session.status,
        action: "edit",
      });
    }

    changes.apply(&mut session, self.clock.now())?;
    if !self
      .store
      .update_session_details(session.clone())
      .await
      .map_err(Error::store)?
    {
      return Err(Error::SessionNotFound(id));
    }

    info!(session = %id, "updated session details");
    Ok(session)
  }

  /// Delete a session together with its participants.
  pub async fn delete_session(&self, id: Uuid, caller: AccountId) -> Result<()> {
    self.load_owned(id, caller, "delete this session").await?;
    if !self.store.delete_session(id).await.map_err(Error::store)? {
      return Err(Error::SessionNotFound(id));
    }
    info!(session = %id, "deleted session");
    Ok(())
  }

  /// Move a session to `to` on the creator's behalf.
  ///
  /// Creators may lock an open session (it must have at least two
  /// participants), reopen a locked one that has no assignments while its
  /// deadline is still ahead, and archive anything that has not ended.
  /// Payment and completion transitions are not theirs to make.
  pub async fn update_status(
    &self,
    id: Uuid,
    caller: AccountId,
    to: SessionStatus,
  ) -> Result<Session> {
    let session = self
      .load_owned(id, caller, "change the session status")
      .await?;
    let from = session.status;
    let now = self.clock.now();

    match (from, to) {
      (SessionStatus::Open, SessionStatus::Locked) => {
        let joined = self
          .store
          .list_participants(id)
          .await
          .map_err(Error::store)?
          .len();
        if joined < 2 {
          return Err(Error::InsufficientParticipants(joined));
        }
      }
      (SessionStatus::Locked, SessionStatus::Open) => {
        if session.has_assignments() {
          return Err(Error::InvalidState {
            status: from,
            action: "reopen",
          });
        }
        if session.registration_closed(now) {
          return Err(Error::Validation(
            "the registration deadline has passed; move it before reopening"
              .into(),
          ));
        }
      }
      (from, SessionStatus::Archived) if !from.is_terminal() => {}
      _ => return Err(Error::InvalidTransition { from, to }),
    }

    self.transition(id, from, to, now).await
  }

  // ─── Assignments ───────────────────────────────────────────────────────

  /// Draw assignments, lock the session and notify every participant.
  ///
  /// Runs at most once per session. The draw and the status change are
  /// committed together; notifications go out only after the commit, and
  /// failed sends are reported in the outcome without undoing the draw.
  pub async fn lock_and_assign(
    &self,
    id: Uuid,
    caller: AccountId,
  ) -> Result<AssignmentOutcome> {
    let session = self.load_owned(id, caller, "draw assignments").await?;
    if !session.accepts_draw() {
      return Err(Error::InvalidState {
        status: session.status,
        action: "draw assignments for",
      });
    }

    for attempt in 1..=MAX_DRAW_ATTEMPTS {
      let participants = self
        .store
        .list_participants(id)
        .await
        .map_err(Error::store)?;
      let ids: Vec<Uuid> =
        participants.iter().map(|p| p.participant_id).collect();
      let assignments = {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        assignment::draw(&ids, &mut *rng)?
      };

      let committed = match self
        .store
        .commit_assignments(id, assignments.clone(), self.clock.now())
        .await
        .map_err(Error::store)?
      {
        CommitOutcome::Committed(session) => session,
        CommitOutcome::SessionMissing => return Err(Error::SessionNotFound(id)),
        CommitOutcome::Rejected(status) => {
          return Err(Error::InvalidState {
            status,
            action: "draw assignments for",
          });
        }
        CommitOutcome::ParticipantsChanged => {
          debug!(session = %id, attempt, "participants changed during draw");
          continue;
        }
      };

      info!(
        session = %id,
        participants = participants.len(),
        "drew assignments and locked session"
      );

      let (notified, partial_failure) =
        assignment::notify_all(&*self.notifier, &participants, &assignments)
          .await;
      if let Some(report) = &partial_failure {
        for failure in &report.failures {
          warn!(
            session = %id,
            participant = %failure.participant_id,
            reason = %failure.reason,
            "failed to send assignment"
          );
        }
        warn!(session = %id, "{report}");
      }

      return Ok(AssignmentOutcome {
        session: committed,
        assignments,
        notified,
        partial_failure,
      });
    }

    Err(Error::DrawContention(id))
  }

  // ─── Participants ──────────────────────────────────────────────────────

  /// Enrol a participant. Anyone holding the session id may join while the
  /// session is open and its plan has room.
  pub async fn join_session(
    &self,
    session_id: Uuid,
    input: NewParticipant,
  ) -> Result<Participant> {
    let input = input.normalized()?;
    let session = self.load(session_id).await?;
    if session.status != SessionStatus::Open {
      return Err(Error::InvalidState {
        status: session.status,
        action: "join",
      });
    }

    let participant = Participant {
      participant_id: Uuid::new_v4(),
      session_id,
      name: input.name,
      email: input.email,
      preferences: None,
      assigned_to: None,
      joined_at: self.clock.now(),
    };

    match self
      .store
      .insert_participant(participant.clone())
      .await
      .map_err(Error::store)?
    {
      JoinOutcome::Joined => {
        info!(
          session = %session_id,
          participant = %participant.participant_id,
          "participant joined"
        );
        Ok(participant)
      }
      JoinOutcome::SessionMissing => Err(Error::SessionNotFound(session_id)),
      JoinOutcome::NotJoinable(status) => {
        Err(Error::InvalidState { status, action: "join" })
      }
      JoinOutcome::LimitReached(limit) => Err(limit.into()),
      JoinOutcome::DuplicateEmail => Err(Error::DuplicateParticipant {
        email: participant.email,
      }),
    }
  }

  /// Remove a participant before assignments are drawn.
  pub async fn remove_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
    caller: AccountId,
  ) -> Result<()> {
    let session = self
      .load_owned(session_id, caller, "remove participants")
      .await?;

    match self
      .store
      .delete_participant(session_id, participant_id)
      .await
      .map_err(Error::store)?
    {
      RemoveOutcome::Removed => {
        info!(
          session = %session_id,
          participant = %participant_id,
          "removed participant"
        );
        Ok(())
      }
      RemoveOutcome::NotFound => Err(Error::ParticipantNotFound(participant_id)),
      RemoveOutcome::AlreadyAssigned => Err(Error::InvalidState {
        status: session.status,
        action: "remove participants from",
      }),
    }
  }

  pub async fn list_participants(
    &self,
    session_id: Uuid,
    caller: AccountId,
  ) -> Result<Vec<Participant>> {
    self
      .load_owned(session_id, caller, "list participants")
      .await?;
    self
      .store
      .list_participants(session_id)
      .await
      .map_err(Error::store)
  }

  /// A participant's own record and, once drawn, their recipient.
  pub async fn participant_view(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<ParticipantView> {
    let participant = self.load_participant(session_id, participant_id).await?;
    let recipient = match participant.assigned_to {
      Some(recipient_id) => self
        .store
        .get_participant(session_id, recipient_id)
        .await
        .map_err(Error::store)?
        .as_ref()
        .map(RecipientView::from),
      None => None,
    };
    Ok(ParticipantView { participant, recipient })
  }

  /// Replace a participant's preferences while the session is open or
  /// locked.
  pub async fn update_preferences(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
    preferences: Preferences,
  ) -> Result<Participant> {
    preferences.validate()?;
    let session = self.load(session_id).await?;
    if !matches!(session.status, SessionStatus::Open | SessionStatus::Locked) {
      return Err(Error::InvalidState {
        status: session.status,
        action: "update preferences in",
      });
    }

    self
      .store
      .update_preferences(session_id, participant_id, preferences)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ParticipantNotFound(participant_id))
  }

  // ─── Payment ───────────────────────────────────────────────────────────

  /// Open a checkout for a session waiting on payment and remember the
  /// gateway's reference for it.
  pub async fn begin_checkout<G: PaymentGateway>(
    &self,
    gateway: &G,
    session_id: Uuid,
    caller: AccountId,
  ) -> Result<CheckoutHandle> {
    let session = self
      .load_owned(session_id, caller, "start checkout")
      .await?;
    if session.status != SessionStatus::PendingPayment {
      return Err(Error::InvalidState {
        status: session.status,
        action: "pay for",
      });
    }

    let handle = gateway
      .create_checkout(&session)
      .await
      .map_err(|err| Error::Payment(err.to_string()))?;

    if !self
      .store
      .set_payment_reference(session_id, handle.reference.clone())
      .await
      .map_err(Error::store)?
    {
      // Deleted or paid for while the gateway was being called.
      let current = self.load(session_id).await?;
      return Err(Error::InvalidState {
        status: current.status,
        action: "pay for",
      });
    }

    info!(session = %session_id, reference = %handle.reference, "checkout started");
    Ok(handle)
  }

  /// Apply a verified gateway event. Completed checkouts open their session;
  /// redelivery of an already applied event is a no-op. Returns the affected
  /// session, or `None` for events that are not acted on.
  pub async fn confirm_payment(
    &self,
    event: PaymentEvent,
  ) -> Result<Option<Session>> {
    let (session_id, reference) = match event {
      PaymentEvent::CheckoutCompleted { session_id, reference } => {
        (session_id, reference)
      }
      PaymentEvent::Ignored { event_type } => {
        debug!(event_type = %event_type, "ignoring payment event");
        return Ok(None);
      }
    };

    let session = self.load(session_id).await?;
    if let Some(stored) = &session.payment_reference
      && *stored != reference
    {
      return Err(
        VerificationError(format!(
          "checkout {reference} does not belong to session {session_id}"
        ))
        .into(),
      );
    }

    match session.status {
      SessionStatus::Open if session.payment_reference.is_some() => {
        debug!(session = %session_id, "payment already applied");
        Ok(Some(session))
      }
      SessionStatus::PendingPayment => {
        // A `false` here means a concurrent delivery opened the session;
        // the transition below reports that case.
        if session.payment_reference.is_none() {
          self
            .store
            .set_payment_reference(session_id, reference)
            .await
            .map_err(Error::store)?;
        }
        let now = self.clock.now();
        match self
          .transition(
            session_id,
            SessionStatus::PendingPayment,
            SessionStatus::Open,
            now,
          )
          .await
        {
          Ok(opened) => Ok(Some(opened)),
          // A concurrent delivery of the same event got there first.
          Err(Error::InvalidTransition { from: SessionStatus::Open, .. }) => {
            self.load(session_id).await.map(Some)
          }
          Err(err) => Err(err),
        }
      }
      from => Err(Error::InvalidTransition { from, to: SessionStatus::Open }),
    }
  }

  // ─── Helpers ───────────────────────────────────────────────────────────

  async fn load(&self, id: Uuid) -> Result<Session> {
    self
      .store
      .get_session(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SessionNotFound(id))
  }

  async fn load_owned(
    &self,
    id: Uuid,
    caller: AccountId,
    action: &'static str,
  ) -> Result<Session> {
    let session = self.load(id).await?;
    if !session.is_owned_by(caller) {
      return Err(Error::Unauthorized(action));
    }
    Ok(session)
  }

  async fn load_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<Participant> {
    self
      .store
      .get_participant(session_id, participant_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ParticipantNotFound(participant_id))
  }

  /// Compare-and-swap the status and return the session as stored
  /// afterwards.
  async fn transition(
    &self,
    id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
    at: DateTime<Utc>,
  ) -> Result<Session> {
    let swapped = self
      .store
      .transition_status(id, from, to, at)
      .await
      .map_err(Error::store)?;
    let session = self.load(id).await?;
    if !swapped {
      return Err(Error::InvalidTransition { from: session.status, to });
    }
    info!(session = %id, from = from.as_str(), to = to.as_str(), "session status changed");
    Ok(session)
  }

  async fn unused_invite_code(&self) -> Result<String> {
    for _ in 0..MAX_INVITE_ATTEMPTS {
      let code = {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        generate_invite_code(&mut *rng)
      };
      let taken = self
        .store
        .find_session_by_invite_code(&code)
        .await
        .map_err(Error::store)?
        .is_some();
      if !taken {
        return Ok(code);
      }
    }
    Err(Error::InviteCodeExhausted)
  }
}
