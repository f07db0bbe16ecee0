//! Lifecycle and scheduler tests against the in-memory store.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone as _, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  AccountId, Error,
  clock::ManualClock,
  lifecycle::Lifecycle,
  memory::MemoryStore,
  notify::Notifier,
  participant::{NewParticipant, Participant, Preferences, Sizes},
  payment::{CheckoutHandle, PaymentEvent, PaymentGateway, VerificationError},
  plan::{Plan, PlanLimitError},
  scheduler::SweepReport,
  session::{NewSession, Session, SessionChanges, SessionStatus},
  store::SessionStore,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("mailbox unavailable")]
struct Undeliverable;

/// Records every message and fails sends to selected addresses.
#[derive(Default)]
struct RecordingNotifier {
  sent:    Mutex<Vec<(String, String)>>,
  failing: HashSet<String>,
}

impl RecordingNotifier {
  fn failing(emails: &[&str]) -> Self {
    Self {
      sent:    Mutex::default(),
      failing: emails.iter().map(|e| e.to_string()).collect(),
    }
  }

  fn sent(&self) -> Vec<(String, String)> { self.sent.lock().unwrap().clone() }
}

impl Notifier for RecordingNotifier {
  type Error = Undeliverable;

  async fn send_assignment(
    &self,
    giver: &Participant,
    recipient_name: &str,
  ) -> Result<(), Undeliverable> {
    if self.failing.contains(&giver.email) {
      return Err(Undeliverable);
    }
    self
      .sent
      .lock()
      .unwrap()
      .push((giver.email.clone(), recipient_name.to_owned()));
    Ok(())
  }
}

#[derive(Debug, Error)]
#[error("gateway offline")]
struct GatewayDown;

struct FakeGateway;

impl PaymentGateway for FakeGateway {
  type Error = GatewayDown;

  async fn create_checkout(
    &self,
    session: &Session,
  ) -> Result<CheckoutHandle, GatewayDown> {
    Ok(CheckoutHandle {
      reference: format!("cs_test_{}", session.session_id.simple()),
      url:       Some("https://pay.example/checkout".into()),
    })
  }

  fn verify_and_parse(
    &self,
    _signature: &str,
    payload: &[u8],
  ) -> Result<PaymentEvent, VerificationError> {
    serde_json::from_slice(payload).map_err(|e| VerificationError(e.to_string()))
  }
}

/// Renames the session through the store while "talking to" the gateway,
/// the way a concurrent edit by the creator would.
struct EditingGateway {
  store: Arc<MemoryStore>,
}

impl PaymentGateway for EditingGateway {
  type Error = GatewayDown;

  async fn create_checkout(
    &self,
    session: &Session,
  ) -> Result<CheckoutHandle, GatewayDown> {
    let mut edited = session.clone();
    edited.name = "Renamed mid-checkout".into();
    assert!(self.store.update_session_details(edited).await.unwrap());
    Ok(CheckoutHandle { reference: "cs_edit".into(), url: None })
  }

  fn verify_and_parse(
    &self,
    _signature: &str,
    _payload: &[u8],
  ) -> Result<PaymentEvent, VerificationError> {
    Err(VerificationError("unused".into()))
  }
}

struct Harness {
  lifecycle: Lifecycle<MemoryStore, RecordingNotifier>,
  store:     Arc<MemoryStore>,
  notifier:  Arc<RecordingNotifier>,
  clock:     Arc<ManualClock>,
}

fn harness() -> Harness { harness_with(RecordingNotifier::default()) }

fn harness_with(notifier: RecordingNotifier) -> Harness {
  let store = Arc::new(MemoryStore::default());
  let notifier = Arc::new(notifier);
  let clock = Arc::new(ManualClock::new(utc(2024, 12, 1, 0)));
  let lifecycle = Lifecycle::new(store.clone(), notifier.clone())
    .with_clock(clock.clone())
    .with_seed(2024);
  Harness { lifecycle, store, notifier, clock }
}

fn local(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
  NaiveDate::from_ymd_opt(y, m, d)
    .unwrap()
    .and_hms_opt(h, 0, 0)
    .unwrap()
}

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn new_session(plan: Plan, tz: Tz) -> NewSession {
  NewSession {
    name: "Office party".into(),
    plan,
    registration_deadline: local(2024, 12, 20, 23),
    gift_exchange_date: local(2024, 12, 24, 18),
    timezone: tz,
    budget: Some(20.0),
  }
}

fn person(name: &str) -> NewParticipant {
  NewParticipant {
    name:  name.into(),
    email: format!("{}@example.com", name.to_lowercase()),
  }
}

impl Harness {
  async fn open_session(&self, creator: AccountId) -> Session {
    self
      .lifecycle
      .create_session(creator, new_session(Plan::Free, chrono_tz::UTC))
      .await
      .unwrap()
  }

  async fn join_all(&self, session: &Session, names: &[&str]) -> Vec<Participant> {
    let mut joined = Vec::new();
    for name in names {
      joined.push(
        self
          .lifecycle
          .join_session(session.session_id, person(name))
          .await
          .unwrap(),
      );
    }
    joined
  }

  async fn session(&self, id: Uuid) -> Session {
    self.store.get_session(id).await.unwrap().unwrap()
  }
}

// ─── Drawing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_friends_exchange_gifts() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  assert_eq!(session.status, SessionStatus::Open);
  assert_eq!(session.invite_code.len(), 8);

  let people = h.join_all(&session, &["Alice", "Bob", "Carol"]).await;
  let outcome = h
    .lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();

  assert_eq!(outcome.session.status, SessionStatus::Locked);
  assert!(outcome.session.assigned_at.is_some());
  assert_eq!(outcome.assignments.len(), 3);
  assert_eq!(outcome.notified, 3);
  assert!(outcome.partial_failure.is_none());

  let stored = h.store.list_participants(session.session_id).await.unwrap();
  let ids: HashSet<Uuid> = people.iter().map(|p| p.participant_id).collect();
  let recipients: HashSet<Uuid> =
    stored.iter().filter_map(|p| p.assigned_to).collect();
  assert_eq!(recipients, ids);
  for p in &stored {
    assert_ne!(p.assigned_to, Some(p.participant_id));
  }

  // Each message names the giver's stored recipient.
  let sent = h.notifier.sent();
  assert_eq!(sent.len(), 3);
  for (email, recipient_name) in sent {
    let giver = stored.iter().find(|p| p.email == email).unwrap();
    let recipient = stored
      .iter()
      .find(|p| Some(p.participant_id) == giver.assigned_to)
      .unwrap();
    assert_eq!(recipient.name, recipient_name);
  }

  let view = h
    .lifecycle
    .participant_view(session.session_id, people[0].participant_id)
    .await
    .unwrap();
  let recipient = view.recipient.expect("recipient after draw");
  assert_eq!(Some(recipient.participant_id), view.participant.assigned_to);
}

#[tokio::test]
async fn one_participant_cannot_draw() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice"]).await;

  let result = h.lifecycle.lock_and_assign(session.session_id, creator).await;
  assert!(matches!(result, Err(Error::InsufficientParticipants(1))));

  let after = h.session(session.session_id).await;
  assert_eq!(after.status, SessionStatus::Open);
  assert!(after.assigned_at.is_none());
  assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn only_the_creator_may_draw() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob"]).await;

  let result = h
    .lifecycle
    .lock_and_assign(session.session_id, Uuid::new_v4())
    .await;
  assert!(matches!(result, Err(Error::Unauthorized(_))));
  assert_eq!(h.session(session.session_id).await.status, SessionStatus::Open);
}

#[tokio::test]
async fn second_draw_is_rejected() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob", "Carol"]).await;

  let first = h
    .lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();
  let again = h.lifecycle.lock_and_assign(session.session_id, creator).await;
  assert!(matches!(
    again,
    Err(Error::InvalidState { status: SessionStatus::Locked, .. })
  ));

  // Nothing was redrawn or resent.
  assert_eq!(h.notifier.sent().len(), 3);
  let stored = h.store.list_participants(session.session_id).await.unwrap();
  for a in first.assignments {
    let giver = stored.iter().find(|p| p.participant_id == a.giver_id).unwrap();
    assert_eq!(giver.assigned_to, Some(a.recipient_id));
  }
}

#[tokio::test]
async fn failed_sends_are_reported_but_keep_the_draw() {
  let h = harness_with(RecordingNotifier::failing(&["carol@example.com"]));
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob", "Carol"]).await;

  let outcome = h
    .lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();

  assert_eq!(outcome.notified, 2);
  let report = outcome.partial_failure.expect("failure report");
  assert_eq!(report.attempted, 3);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].email, "carol@example.com");
  assert_eq!(
    report.to_string(),
    "assignments created; 1 of 3 emails failed to send"
  );
  assert_eq!(
    h.session(session.session_id).await.status,
    SessionStatus::Locked
  );
}

#[tokio::test]
async fn failed_commit_leaves_session_open() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob", "Carol"]).await;

  h.store.fail_commits(true);
  let result = h.lifecycle.lock_and_assign(session.session_id, creator).await;
  assert!(matches!(result, Err(Error::Store(_))));

  let after = h.session(session.session_id).await;
  assert_eq!(after.status, SessionStatus::Open);
  assert!(after.assigned_at.is_none());
  let stored = h.store.list_participants(session.session_id).await.unwrap();
  assert!(stored.iter().all(|p| p.assigned_to.is_none()));
  assert!(h.notifier.sent().is_empty());

  h.store.fail_commits(false);
  h.lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();
}

// ─── Joining ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn free_plan_stops_at_fifteen() {
  let h = harness();
  let session = h.open_session(Uuid::new_v4()).await;

  for i in 0..15 {
    h.lifecycle
      .join_session(session.session_id, person(&format!("Guest{i}")))
      .await
      .unwrap();
  }
  let sixteenth = h
    .lifecycle
    .join_session(session.session_id, person("Latecomer"))
    .await;
  assert!(matches!(
    sixteenth,
    Err(Error::PlanLimit(PlanLimitError::Participants { plan: Plan::Free, max: 15 }))
  ));
  assert_eq!(
    h.store.list_participants(session.session_id).await.unwrap().len(),
    15
  );
}

#[tokio::test]
async fn same_email_joins_once() {
  let h = harness();
  let session = h.open_session(Uuid::new_v4()).await;
  h.join_all(&session, &["Alice"]).await;

  let again = h
    .lifecycle
    .join_session(session.session_id, NewParticipant {
      name:  "Alice Again".into(),
      email: " ALICE@example.com".into(),
    })
    .await;
  assert!(matches!(again, Err(Error::DuplicateParticipant { .. })));
}

#[tokio::test]
async fn locked_session_rejects_joins() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob"]).await;
  h.lifecycle
    .update_status(session.session_id, creator, SessionStatus::Locked)
    .await
    .unwrap();

  let late = h.lifecycle.join_session(session.session_id, person("Dan")).await;
  assert!(matches!(
    late,
    Err(Error::InvalidState { status: SessionStatus::Locked, .. })
  ));
}

#[tokio::test]
async fn participants_can_be_removed_until_the_draw() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  let people = h.join_all(&session, &["Alice", "Bob", "Carol", "Dan"]).await;

  let stranger = h
    .lifecycle
    .remove_participant(session.session_id, people[3].participant_id, Uuid::new_v4())
    .await;
  assert!(matches!(stranger, Err(Error::Unauthorized(_))));

  h.lifecycle
    .remove_participant(session.session_id, people[3].participant_id, creator)
    .await
    .unwrap();
  let missing = h
    .lifecycle
    .remove_participant(session.session_id, people[3].participant_id, creator)
    .await;
  assert!(matches!(missing, Err(Error::ParticipantNotFound(_))));

  h.lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();
  let frozen = h
    .lifecycle
    .remove_participant(session.session_id, people[0].participant_id, creator)
    .await;
  assert!(matches!(frozen, Err(Error::InvalidState { .. })));
}

#[tokio::test]
async fn preferences_are_validated_and_frozen_after_completion() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  let people = h.join_all(&session, &["Alice", "Bob"]).await;
  let alice = people[0].participant_id;

  let bad = Preferences {
    sizes: Sizes { ring: Some(12), ..Default::default() },
    ..Default::default()
  };
  assert!(matches!(
    h.lifecycle.update_preferences(session.session_id, alice, bad).await,
    Err(Error::Validation(_))
  ));

  let prefs = Preferences {
    interests: vec!["Board games".into()],
    ..Default::default()
  };
  let updated = h
    .lifecycle
    .update_preferences(session.session_id, alice, prefs.clone())
    .await
    .unwrap();
  assert_eq!(updated.preferences, Some(prefs.clone()));

  // Another session's id does not reach Alice.
  let other = h.open_session(Uuid::new_v4()).await;
  assert!(matches!(
    h.lifecycle.update_preferences(other.session_id, alice, prefs.clone()).await,
    Err(Error::ParticipantNotFound(_))
  ));

  h.lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();
  h.clock.set(utc(2024, 12, 26, 0));
  h.lifecycle.run_scheduled_sweep().await;
  assert!(matches!(
    h.lifecycle.update_preferences(session.session_id, alice, prefs).await,
    Err(Error::InvalidState { status: SessionStatus::Completed, .. })
  ));
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn free_creator_runs_one_session_at_a_time() {
  let h = harness();
  let creator = Uuid::new_v4();
  let first = h.open_session(creator).await;

  let second = h
    .lifecycle
    .create_session(creator, new_session(Plan::Free, chrono_tz::UTC))
    .await;
  assert!(matches!(
    second,
    Err(Error::PlanLimit(PlanLimitError::ActiveSessions { max: 1, .. }))
  ));

  h.lifecycle
    .update_status(first.session_id, creator, SessionStatus::Archived)
    .await
    .unwrap();
  h.lifecycle
    .create_session(creator, new_session(Plan::Free, chrono_tz::UTC))
    .await
    .unwrap();
  assert_eq!(h.lifecycle.list_sessions(creator).await.unwrap().len(), 2);
}

#[tokio::test]
async fn creator_status_changes() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  let id = session.session_id;

  assert!(matches!(
    h.lifecycle.update_status(id, creator, SessionStatus::Locked).await,
    Err(Error::InsufficientParticipants(0))
  ));
  assert!(matches!(
    h.lifecycle.update_status(id, creator, SessionStatus::Completed).await,
    Err(Error::InvalidTransition { .. })
  ));

  h.join_all(&session, &["Alice", "Bob"]).await;
  let locked = h
    .lifecycle
    .update_status(id, creator, SessionStatus::Locked)
    .await
    .unwrap();
  assert_eq!(locked.status, SessionStatus::Locked);
  assert!(locked.assigned_at.is_none());

  let reopened = h
    .lifecycle
    .update_status(id, creator, SessionStatus::Open)
    .await
    .unwrap();
  assert_eq!(reopened.status, SessionStatus::Open);

  let archived = h
    .lifecycle
    .update_status(id, creator, SessionStatus::Archived)
    .await
    .unwrap();
  assert_eq!(archived.status, SessionStatus::Archived);
  assert!(matches!(
    h.lifecycle.update_status(id, creator, SessionStatus::Open).await,
    Err(Error::InvalidTransition { from: SessionStatus::Archived, .. })
  ));
}

#[tokio::test]
async fn drawn_session_cannot_reopen_or_be_edited() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob"]).await;
  h.lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();

  assert!(matches!(
    h.lifecycle
      .update_status(session.session_id, creator, SessionStatus::Open)
      .await,
    Err(Error::InvalidState { .. })
  ));
  let rename = SessionChanges { name: Some("New".into()), ..Default::default() };
  assert!(matches!(
    h.lifecycle.update_session(session.session_id, creator, rename).await,
    Err(Error::InvalidState { .. })
  ));
}

#[tokio::test]
async fn session_details_can_be_edited() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;

  let changes = SessionChanges {
    name: Some("Family".into()),
    budget: Some(30.0),
    registration_deadline: Some(local(2024, 12, 18, 12)),
    ..Default::default()
  };
  let updated = h
    .lifecycle
    .update_session(session.session_id, creator, changes)
    .await
    .unwrap();
  assert_eq!(updated.name, "Family");
  assert_eq!(h.session(session.session_id).await, updated);

  let stranger = h
    .lifecycle
    .update_session(session.session_id, Uuid::new_v4(), SessionChanges::default())
    .await;
  assert!(matches!(stranger, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn deleting_a_session_removes_its_participants() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob"]).await;

  h.lifecycle
    .delete_session(session.session_id, creator)
    .await
    .unwrap();
  assert!(matches!(
    h.lifecycle.get_session(session.session_id, creator).await,
    Err(Error::SessionNotFound(_))
  ));
  assert!(
    h.store
      .list_participants(session.session_id)
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn invite_codes_find_joinable_sessions() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;

  let found = h
    .lifecycle
    .get_session_by_invite_code(&session.invite_code.to_lowercase())
    .await
    .unwrap();
  assert_eq!(found.session_id, session.session_id);

  assert!(matches!(
    h.lifecycle.get_session_by_invite_code("NOPE0000").await,
    Err(Error::InviteNotFound(_))
  ));

  h.lifecycle
    .update_status(session.session_id, creator, SessionStatus::Archived)
    .await
    .unwrap();
  assert!(matches!(
    h.lifecycle.get_session_by_invite_code(&session.invite_code).await,
    Err(Error::InvalidState { status: SessionStatus::Archived, .. })
  ));
}

// ─── Payment ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn paid_session_opens_after_checkout() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h
    .lifecycle
    .create_session(creator, new_session(Plan::Group, chrono_tz::UTC))
    .await
    .unwrap();
  assert_eq!(session.status, SessionStatus::PendingPayment);

  assert!(matches!(
    h.lifecycle.join_session(session.session_id, person("Alice")).await,
    Err(Error::InvalidState { status: SessionStatus::PendingPayment, .. })
  ));

  let handle = h
    .lifecycle
    .begin_checkout(&FakeGateway, session.session_id, creator)
    .await
    .unwrap();
  assert_eq!(
    h.session(session.session_id).await.payment_reference,
    Some(handle.reference.clone())
  );

  let forged = PaymentEvent::CheckoutCompleted {
    session_id: session.session_id,
    reference:  "cs_test_forged".into(),
  };
  assert!(matches!(
    h.lifecycle.confirm_payment(forged).await,
    Err(Error::Verification(_))
  ));

  let event = PaymentEvent::CheckoutCompleted {
    session_id: session.session_id,
    reference:  handle.reference.clone(),
  };
  let opened = h.lifecycle.confirm_payment(event.clone()).await.unwrap();
  assert_eq!(opened.map(|s| s.status), Some(SessionStatus::Open));

  // Redelivery changes nothing.
  let again = h.lifecycle.confirm_payment(event).await.unwrap();
  assert_eq!(again.map(|s| s.status), Some(SessionStatus::Open));

  h.lifecycle
    .join_session(session.session_id, person("Alice"))
    .await
    .unwrap();
}

#[tokio::test]
async fn unrelated_payment_events_are_ignored() {
  let h = harness();
  let event = FakeGateway
    .verify_and_parse(
      "",
      br#"{"kind":"ignored","event_type":"invoice.paid"}"#,
    )
    .unwrap();
  assert_eq!(h.lifecycle.confirm_payment(event).await.unwrap(), None);
}

#[tokio::test]
async fn checkout_keeps_edits_made_while_the_gateway_is_called() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h
    .lifecycle
    .create_session(creator, new_session(Plan::Business, chrono_tz::UTC))
    .await
    .unwrap();

  let gateway = EditingGateway { store: h.store.clone() };
  h.lifecycle
    .begin_checkout(&gateway, session.session_id, creator)
    .await
    .unwrap();

  let stored = h.session(session.session_id).await;
  assert_eq!(stored.name, "Renamed mid-checkout");
  assert_eq!(stored.payment_reference.as_deref(), Some("cs_edit"));

  let opened = h
    .lifecycle
    .confirm_payment(PaymentEvent::CheckoutCompleted {
      session_id: session.session_id,
      reference:  "cs_edit".into(),
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(opened.name, "Renamed mid-checkout");
  assert_eq!(opened.status, SessionStatus::Open);
}

#[tokio::test]
async fn checkout_is_only_for_pending_sessions() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  assert!(matches!(
    h.lifecycle
      .begin_checkout(&FakeGateway, session.session_id, creator)
      .await,
    Err(Error::InvalidState { status: SessionStatus::Open, .. })
  ));
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_locks_then_completes() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  let id = session.session_id;
  h.join_all(&session, &["Alice", "Bob"]).await;

  let report = h.lifecycle.run_scheduled_sweep().await;
  assert!(report.locked.is_empty() && report.completed.is_empty());

  // Deadline is 20 Dec 23:00 UTC.
  h.clock.set(utc(2024, 12, 21, 0));
  let report = h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(report.locked, vec![id]);
  let locked = h.session(id).await;
  assert_eq!(locked.status, SessionStatus::Locked);
  assert!(locked.assigned_at.is_none());
  assert!(h.notifier.sent().is_empty());

  // Idempotent.
  assert!(h.lifecycle.run_scheduled_sweep().await.locked.is_empty());

  // Exchange is 24 Dec 18:00, so completion is due 25 Dec 18:00.
  h.clock.set(utc(2024, 12, 25, 17));
  assert!(h.lifecycle.run_scheduled_sweep().await.completed.is_empty());
  h.clock.set(utc(2024, 12, 25, 18));
  let report = h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(report.completed, vec![id]);
  let done = h.session(id).await;
  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.completed_at, Some(utc(2024, 12, 25, 18)));

  h.clock.advance(Duration::days(30));
  let report = h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(report, SweepReport::default());
  assert_eq!(h.session(id).await.status, SessionStatus::Completed);
}

#[tokio::test]
async fn deadline_follows_the_session_timezone() {
  let h = harness();
  let session = h
    .lifecycle
    .create_session(Uuid::new_v4(), new_session(Plan::Free, chrono_tz::America::New_York))
    .await
    .unwrap();

  // 23:00 in New York on 20 Dec is 04:00 UTC on 21 Dec.
  h.clock.set(utc(2024, 12, 21, 2));
  h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(h.session(session.session_id).await.status, SessionStatus::Open);

  h.clock.set(utc(2024, 12, 21, 5));
  h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(
    h.session(session.session_id).await.status,
    SessionStatus::Locked
  );
}

#[tokio::test]
async fn deadline_locked_session_can_still_be_drawn() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.join_all(&session, &["Alice", "Bob", "Carol"]).await;

  h.clock.set(utc(2024, 12, 21, 0));
  h.lifecycle.run_scheduled_sweep().await;

  let outcome = h
    .lifecycle
    .lock_and_assign(session.session_id, creator)
    .await
    .unwrap();
  assert_eq!(outcome.session.status, SessionStatus::Locked);
  assert!(outcome.session.assigned_at.is_some());
}

#[tokio::test]
async fn one_failing_session_does_not_stop_the_sweep() {
  let h = harness();
  let broken = h.open_session(Uuid::new_v4()).await;
  let healthy = h.open_session(Uuid::new_v4()).await;
  h.store.fail_transitions_for(broken.session_id);

  h.clock.set(utc(2024, 12, 21, 0));
  let report = h.lifecycle.run_scheduled_sweep().await;

  assert_eq!(report.locked, vec![healthy.session_id]);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].session_id, Some(broken.session_id));
  assert_eq!(h.session(broken.session_id).await.status, SessionStatus::Open);
}

#[tokio::test]
async fn archived_sessions_are_left_alone() {
  let h = harness();
  let creator = Uuid::new_v4();
  let session = h.open_session(creator).await;
  h.lifecycle
    .update_status(session.session_id, creator, SessionStatus::Archived)
    .await
    .unwrap();

  h.clock.set(utc(2025, 1, 31, 0));
  let report = h.lifecycle.run_scheduled_sweep().await;
  assert_eq!(report, SweepReport::default());
  assert_eq!(
    h.session(session.session_id).await.status,
    SessionStatus::Archived
  );
}
