//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Instants are stored as RFC 3339 strings. Session deadlines are local
//! wall-clock times and are stored without an offset next to the session's
//! IANA timezone name. Preferences are stored as compact JSON.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use santa_core::{
  participant::{Participant, Preferences},
  plan::Plan,
  session::{Session, SessionStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Time ────────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode { column: "timestamp", reason: e.to_string() })
}

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn encode_local(dt: NaiveDateTime) -> String {
  dt.format(LOCAL_FORMAT).to_string()
}

pub fn decode_local(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, LOCAL_FORMAT)
    .map_err(|e| Error::Decode { column: "local time", reason: e.to_string() })
}

pub fn encode_tz(tz: Tz) -> &'static str { tz.name() }

pub fn decode_tz(s: &str) -> Result<Tz> {
  s.parse()
    .map_err(|e| Error::Decode { column: "timezone", reason: format!("{e}") })
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: SessionStatus) -> &'static str { s.as_str() }

pub fn decode_status(s: &str) -> Result<SessionStatus> {
  SessionStatus::ALL
    .into_iter()
    .find(|status| status.as_str() == s)
    .ok_or_else(|| Error::Decode {
      column: "status",
      reason: format!("unknown session status: {s:?}"),
    })
}

pub fn encode_plan(p: Plan) -> &'static str { p.as_str() }

pub fn decode_plan(s: &str) -> Result<Plan> {
  Plan::ALL
    .into_iter()
    .find(|plan| plan.as_str() == s)
    .ok_or_else(|| Error::Decode {
      column: "plan",
      reason: format!("unknown plan: {s:?}"),
    })
}

// ─── Preferences ─────────────────────────────────────────────────────────────

pub fn encode_preferences(p: &Preferences) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_preferences(s: &str) -> Result<Preferences> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawSession::from_row`].
pub const SESSION_COLUMNS: &str = "session_id, invite_code, name, creator_id, \
  plan, status, registration_deadline, gift_exchange_date, timezone, budget, \
  payment_reference, assigned_at, completed_at, created_at";

/// Raw values read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:            String,
  pub invite_code:           String,
  pub name:                  String,
  pub creator_id:            String,
  pub plan:                  String,
  pub status:                String,
  pub registration_deadline: String,
  pub gift_exchange_date:    String,
  pub timezone:              String,
  pub budget:                Option<f64>,
  pub payment_reference:     Option<String>,
  pub assigned_at:           Option<String>,
  pub completed_at:          Option<String>,
  pub created_at:            String,
}

impl RawSession {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:            row.get(0)?,
      invite_code:           row.get(1)?,
      name:                  row.get(2)?,
      creator_id:            row.get(3)?,
      plan:                  row.get(4)?,
      status:                row.get(5)?,
      registration_deadline: row.get(6)?,
      gift_exchange_date:    row.get(7)?,
      timezone:              row.get(8)?,
      budget:                row.get(9)?,
      payment_reference:     row.get(10)?,
      assigned_at:           row.get(11)?,
      completed_at:          row.get(12)?,
      created_at:            row.get(13)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      session_id:            decode_uuid(&self.session_id)?,
      invite_code:           self.invite_code,
      name:                  self.name,
      creator_id:            decode_uuid(&self.creator_id)?,
      plan:                  decode_plan(&self.plan)?,
      status:                decode_status(&self.status)?,
      registration_deadline: decode_local(&self.registration_deadline)?,
      gift_exchange_date:    decode_local(&self.gift_exchange_date)?,
      timezone:              decode_tz(&self.timezone)?,
      budget:                self.budget,
      payment_reference:     self.payment_reference,
      assigned_at:           self.assigned_at.as_deref().map(decode_dt).transpose()?,
      completed_at:          self.completed_at.as_deref().map(decode_dt).transpose()?,
      created_at:            decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawParticipant::from_row`].
pub const PARTICIPANT_COLUMNS: &str =
  "participant_id, session_id, name, email, preferences, assigned_to, joined_at";

/// Raw values read directly from a `participants` row.
pub struct RawParticipant {
  pub participant_id: String,
  pub session_id:     String,
  pub name:           String,
  pub email:          String,
  pub preferences:    Option<String>,
  pub assigned_to:    Option<String>,
  pub joined_at:      String,
}

impl RawParticipant {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      participant_id: row.get(0)?,
      session_id:     row.get(1)?,
      name:           row.get(2)?,
      email:          row.get(3)?,
      preferences:    row.get(4)?,
      assigned_to:    row.get(5)?,
      joined_at:      row.get(6)?,
    })
  }

  pub fn into_participant(self) -> Result<Participant> {
    Ok(Participant {
      participant_id: decode_uuid(&self.participant_id)?,
      session_id:     decode_uuid(&self.session_id)?,
      name:           self.name,
      email:          self.email,
      preferences:    self
        .preferences
        .as_deref()
        .map(decode_preferences)
        .transpose()?,
      assigned_to:    self.assigned_to.as_deref().map(decode_uuid).transpose()?,
      joined_at:      decode_dt(&self.joined_at)?,
    })
  }
}
