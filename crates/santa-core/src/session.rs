//! Sessions: one gift exchange with its own deadlines, plan and status.
//!
//! Deadlines are stored as local wall-clock times together with the IANA
//! timezone the organiser picked. They are projected onto UTC only when a
//! comparison against "now" is needed, so a deadline of 23:00 in New York
//! stays 23:00 in New York across DST changes.

use std::fmt;

use chrono::{
  DateTime, Duration, LocalResult, NaiveDateTime, Offset as _, TimeZone as _,
  Utc,
};
use chrono_tz::Tz;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountId, Error, Result, plan::Plan};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where a session sits in its lifecycle.
///
/// ```text
/// PendingPayment ─▶ Open ─▶ Locked ─▶ Completed
///        └───────────┴────────┴──────▶ Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  /// Created on a paid plan; waiting for the checkout webhook.
  PendingPayment,
  /// Accepting participants.
  Open,
  /// Registration is frozen. Assignments may or may not have been drawn.
  Locked,
  /// The exchange date has passed.
  Completed,
  /// Closed early by the creator.
  Archived,
}

impl SessionStatus {
  pub const ALL: [SessionStatus; 5] = [
    SessionStatus::PendingPayment,
    SessionStatus::Open,
    SessionStatus::Locked,
    SessionStatus::Completed,
    SessionStatus::Archived,
  ];

  /// Active sessions count towards a plan's concurrent-event limit.
  pub fn is_active(self) -> bool {
    matches!(self, Self::PendingPayment | Self::Open | Self::Locked)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Archived)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::PendingPayment => "pending_payment",
      Self::Open => "open",
      Self::Locked => "locked",
      Self::Completed => "completed",
      Self::Archived => "archived",
    }
  }
}

impl fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::PendingPayment => "pending payment",
      Self::Open => "open",
      Self::Locked => "locked",
      Self::Completed => "completed",
      Self::Archived => "archived",
    })
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub session_id:            Uuid,
  /// Short shareable code participants use to find the session.
  pub invite_code:           String,
  pub name:                  String,
  pub creator_id:            AccountId,
  pub plan:                  Plan,
  pub status:                SessionStatus,
  /// Local wall-clock time in `timezone` at which registration closes.
  pub registration_deadline: NaiveDateTime,
  /// Local wall-clock time in `timezone` of the exchange itself.
  pub gift_exchange_date:    NaiveDateTime,
  pub timezone:              Tz,
  pub budget:                Option<f64>,
  /// Checkout reference issued by the payment gateway, if any.
  pub payment_reference:     Option<String>,
  /// Set exactly once, when assignments are drawn.
  pub assigned_at:           Option<DateTime<Utc>>,
  pub completed_at:          Option<DateTime<Utc>>,
  pub created_at:            DateTime<Utc>,
}

impl Session {
  pub fn is_owned_by(&self, account: AccountId) -> bool {
    self.creator_id == account
  }

  pub fn has_assignments(&self) -> bool { self.assigned_at.is_some() }

  /// The instant registration closes.
  pub fn registration_closes_at(&self) -> DateTime<Utc> {
    local_to_utc(self.timezone, self.registration_deadline)
  }

  /// The instant the session becomes due for completion: one day after the
  /// exchange date, in the session's own timezone.
  pub fn completes_at(&self) -> DateTime<Utc> {
    local_to_utc(self.timezone, self.gift_exchange_date + Duration::days(1))
  }

  pub fn registration_closed(&self, now: DateTime<Utc>) -> bool {
    now >= self.registration_closes_at()
  }

  pub fn due_for_completion(&self, now: DateTime<Utc>) -> bool {
    now >= self.completes_at()
  }

  /// Whether a draw may still run: open, or frozen by the deadline sweep
  /// before anyone drew.
  pub fn accepts_draw(&self) -> bool {
    !self.has_assignments()
      && matches!(self.status, SessionStatus::Open | SessionStatus::Locked)
  }
}

/// Project a local wall-clock time in `tz` onto UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// do not exist (DST spring-forward gap) use the offset in force just before
/// the gap.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
  match tz.from_local_datetime(&local) {
    LocalResult::Single(dt) => dt.with_timezone(&Utc),
    LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
    LocalResult::None => {
      let offset = tz.offset_from_utc_datetime(&local).fix();
      let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
      Utc.from_utc_datetime(&utc)
    }
  }
}

// ─── Input types ─────────────────────────────────────────────────────────────

/// Input to [`crate::lifecycle::Lifecycle::create_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
  pub name:                  String,
  #[serde(default)]
  pub plan:                  Plan,
  pub registration_deadline: NaiveDateTime,
  pub gift_exchange_date:    NaiveDateTime,
  pub timezone:              Tz,
  pub budget:                Option<f64>,
}

impl NewSession {
  pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
    validate_name(&self.name)?;
    validate_budget(self.budget)?;
    validate_schedule(
      self.timezone,
      self.registration_deadline,
      self.gift_exchange_date,
      Some(now),
    )
  }
}

/// Partial update accepted by
/// [`crate::lifecycle::Lifecycle::update_session`]. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionChanges {
  pub name:                  Option<String>,
  pub budget:                Option<f64>,
  pub registration_deadline: Option<NaiveDateTime>,
  pub gift_exchange_date:    Option<NaiveDateTime>,
  pub timezone:              Option<Tz>,
}

impl SessionChanges {
  /// Apply onto `session`, validating the merged result. A moved deadline
  /// must still lie in the future.
  pub fn apply(self, session: &mut Session, now: DateTime<Utc>) -> Result<()> {
    if let Some(name) = &self.name {
      validate_name(name)?;
    }
    validate_budget(self.budget)?;

    let deadline_moved =
      self.registration_deadline.is_some() || self.timezone.is_some();
    let timezone = self.timezone.unwrap_or(session.timezone);
    let deadline =
      self.registration_deadline.unwrap_or(session.registration_deadline);
    let exchange = self.gift_exchange_date.unwrap_or(session.gift_exchange_date);
    validate_schedule(timezone, deadline, exchange, deadline_moved.then_some(now))?;

    if let Some(name) = self.name {
      session.name = name.trim().to_owned();
    }
    if self.budget.is_some() {
      session.budget = self.budget;
    }
    session.timezone = timezone;
    session.registration_deadline = deadline;
    session.gift_exchange_date = exchange;
    Ok(())
  }
}

fn validate_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Validation("session name must not be empty".into()));
  }
  Ok(())
}

fn validate_budget(budget: Option<f64>) -> Result<()> {
  match budget {
    Some(b) if !b.is_finite() || b < 0.0 => Err(Error::Validation(
      "budget must be a non-negative number".into(),
    )),
    _ => Ok(()),
  }
}

fn validate_schedule(
  tz: Tz,
  deadline: NaiveDateTime,
  exchange: NaiveDateTime,
  now: Option<DateTime<Utc>>,
) -> Result<()> {
  if let Some(now) = now
    && local_to_utc(tz, deadline) <= now
  {
    return Err(Error::Validation(
      "registration deadline must be in the future".into(),
    ));
  }
  if exchange <= deadline {
    return Err(Error::Validation(
      "gift exchange date must be after the registration deadline".into(),
    ));
  }
  Ok(())
}

// ─── Invite codes ────────────────────────────────────────────────────────────

pub const INVITE_CODE_LEN: usize = 8;
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A fresh invite code: [`INVITE_CODE_LEN`] characters over `A-Z0-9`.
pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
  (0..INVITE_CODE_LEN)
    .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
    .collect()
}
