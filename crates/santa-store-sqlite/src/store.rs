//! [`SqliteStore`], the SQLite implementation of [`SessionStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use santa_core::{
  AccountId,
  assignment::Assignment,
  participant::{Participant, Preferences},
  session::{Session, SessionStatus},
  store::{CommitOutcome, JoinOutcome, RemoveOutcome, SessionStore},
};

use crate::{
  Error, Result,
  encode::{
    PARTICIPANT_COLUMNS, RawParticipant, RawSession, SESSION_COLUMNS,
    decode_plan, decode_status, encode_dt, encode_local, encode_plan,
    encode_preferences, encode_status, encode_tz, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A session store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What a commit transaction saw, before decoding.
enum RawCommit {
  Missing,
  Rejected(String),
  Changed,
  Committed(RawSession),
}

/// What a join transaction saw, before decoding.
enum RawJoin {
  Missing,
  NotOpen(String),
  Duplicate,
  Counted { plan: String, members: usize },
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_sessions(
    &self,
    filter: &'static str,
    param: String,
  ) -> Result<Vec<Session>> {
    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SESSION_COLUMNS} FROM sessions WHERE {filter}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![param], RawSession::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }
}

fn select_session(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawSession>> {
  conn
    .query_row(
      &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
      rusqlite::params![id],
      RawSession::from_row,
    )
    .optional()
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = Error;

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn insert_session(&self, session: Session) -> Result<()> {
    let params = (
      encode_uuid(session.session_id),
      session.invite_code,
      session.name,
      encode_uuid(session.creator_id),
      encode_plan(session.plan),
      encode_status(session.status),
      encode_local(session.registration_deadline),
      encode_local(session.gift_exchange_date),
      encode_tz(session.timezone),
      session.budget,
      session.payment_reference,
      session.assigned_at.map(encode_dt),
      session.completed_at.map(encode_dt),
      encode_dt(session.created_at),
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO sessions ({SESSION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
          ),
          params,
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_session(conn, &id_str)?))
      .await?;
    raw.map(RawSession::into_session).transpose()
  }

  async fn find_session_by_invite_code(
    &self,
    code: &str,
  ) -> Result<Option<Session>> {
    let mut found = self
      .query_sessions("invite_code = ?1", code.to_owned())
      .await?;
    Ok(found.pop())
  }

  async fn list_sessions_by_creator(
    &self,
    creator: AccountId,
  ) -> Result<Vec<Session>> {
    self
      .query_sessions(
        "creator_id = ?1 ORDER BY created_at DESC",
        encode_uuid(creator),
      )
      .await
  }

  async fn list_sessions_by_status(
    &self,
    status: SessionStatus,
  ) -> Result<Vec<Session>> {
    self
      .query_sessions("status = ?1", encode_status(status).to_owned())
      .await
  }

  async fn count_active_sessions(&self, creator: AccountId) -> Result<u32> {
    let creator_str = encode_uuid(creator);
    let count: u32 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM sessions
           WHERE creator_id = ?1
             AND status IN ('pending_payment', 'open', 'locked')",
          rusqlite::params![creator_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count)
  }

  async fn update_session_details(&self, session: Session) -> Result<bool> {
    let params = (
      encode_uuid(session.session_id),
      session.name,
      session.budget,
      encode_local(session.registration_deadline),
      encode_local(session.gift_exchange_date),
      encode_tz(session.timezone),
    );

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions
           SET name = ?2, budget = ?3, registration_deadline = ?4,
               gift_exchange_date = ?5, timezone = ?6
           WHERE session_id = ?1",
          params,
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn set_payment_reference(&self, id: Uuid, reference: String) -> Result<bool> {
    let id = encode_uuid(id);
    let pending = encode_status(SessionStatus::PendingPayment);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions SET payment_reference = ?2
           WHERE session_id = ?1 AND status = ?3",
          (id, reference, pending),
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn transition_status(
    &self,
    id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);
    let from_str = encode_status(from);
    let to_str = encode_status(to);
    let completed_at = (to == SessionStatus::Completed).then(|| encode_dt(at));

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions
           SET status = ?3, completed_at = COALESCE(?4, completed_at)
           WHERE session_id = ?1 AND status = ?2",
          rusqlite::params![id_str, from_str, to_str, completed_at],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn delete_session(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM sessions WHERE session_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  // ── Participants ──────────────────────────────────────────────────────────

  async fn insert_participant(
    &self,
    participant: Participant,
  ) -> Result<JoinOutcome> {
    let session_str = encode_uuid(participant.session_id);
    let preferences =
      participant.preferences.as_ref().map(encode_preferences).transpose()?;
    let row = (
      encode_uuid(participant.participant_id),
      session_str.clone(),
      participant.name,
      participant.email.clone(),
      preferences,
      participant.assigned_to.map(encode_uuid),
      encode_dt(participant.joined_at),
    );
    let email = participant.email;

    // Checks and insert share one write transaction. The member count is
    // handed back so the caller sees the same limit the insert obeyed.
    let seen = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let session: Option<(String, String)> = tx
          .query_row(
            "SELECT status, plan FROM sessions WHERE session_id = ?1",
            rusqlite::params![session_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;
        let Some((status, plan)) = session else {
          return Ok(RawJoin::Missing);
        };
        if status != encode_status(SessionStatus::Open) {
          return Ok(RawJoin::NotOpen(status));
        }

        let duplicate = tx
          .query_row(
            "SELECT 1 FROM participants WHERE session_id = ?1 AND email = ?2",
            rusqlite::params![session_str, email],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if duplicate {
          return Ok(RawJoin::Duplicate);
        }

        let members: usize = tx.query_row(
          "SELECT COUNT(*) FROM participants WHERE session_id = ?1",
          rusqlite::params![session_str],
          |row| row.get(0),
        )?;

        // Dropping `tx` uncommitted rolls back.
        let admits = decode_plan(&plan)
          .map(|p| p.check_participant_capacity(members).is_ok())
          .unwrap_or(false);
        if admits {
          tx.execute(
            &format!(
              "INSERT INTO participants ({PARTICIPANT_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            row,
          )?;
          tx.commit()?;
        }
        Ok(RawJoin::Counted { plan, members })
      })
      .await?;

    Ok(match seen {
      RawJoin::Missing => JoinOutcome::SessionMissing,
      RawJoin::NotOpen(status) => JoinOutcome::NotJoinable(decode_status(&status)?),
      RawJoin::Duplicate => JoinOutcome::DuplicateEmail,
      RawJoin::Counted { plan, members } => {
        match decode_plan(&plan)?.check_participant_capacity(members) {
          Ok(()) => JoinOutcome::Joined,
          Err(limit) => JoinOutcome::LimitReached(limit),
        }
      }
    })
  }

  async fn get_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<Option<Participant>> {
    let session_str = encode_uuid(session_id);
    let participant_str = encode_uuid(participant_id);

    let raw: Option<RawParticipant> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants
                 WHERE session_id = ?1 AND participant_id = ?2"
              ),
              rusqlite::params![session_str, participant_str],
              RawParticipant::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawParticipant::into_participant).transpose()
  }

  async fn list_participants(&self, session_id: Uuid) -> Result<Vec<Participant>> {
    let session_str = encode_uuid(session_id);

    let raws: Vec<RawParticipant> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PARTICIPANT_COLUMNS} FROM participants
           WHERE session_id = ?1
           ORDER BY joined_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![session_str], RawParticipant::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawParticipant::into_participant).collect()
  }

  async fn update_preferences(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
    preferences: Preferences,
  ) -> Result<Option<Participant>> {
    let session_str = encode_uuid(session_id);
    let participant_str = encode_uuid(participant_id);
    let json = encode_preferences(&preferences)?;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE participants SET preferences = ?3
           WHERE session_id = ?1 AND participant_id = ?2",
          rusqlite::params![session_str, participant_str, json],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.get_participant(session_id, participant_id).await
  }

  async fn delete_participant(
    &self,
    session_id: Uuid,
    participant_id: Uuid,
  ) -> Result<RemoveOutcome> {
    let session_str = encode_uuid(session_id);
    let participant_str = encode_uuid(participant_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let assigned: Option<Option<String>> = tx
          .query_row(
            "SELECT assigned_at FROM sessions WHERE session_id = ?1",
            rusqlite::params![session_str],
            |row| row.get(0),
          )
          .optional()?;
        if matches!(assigned, Some(Some(_))) {
          return Ok(RemoveOutcome::AlreadyAssigned);
        }

        let removed = tx.execute(
          "DELETE FROM participants WHERE session_id = ?1 AND participant_id = ?2",
          rusqlite::params![session_str, participant_str],
        )?;
        tx.commit()?;
        Ok(if removed == 1 {
          RemoveOutcome::Removed
        } else {
          RemoveOutcome::NotFound
        })
      })
      .await?;
    Ok(outcome)
  }

  // ── Assignments ───────────────────────────────────────────────────────────

  async fn commit_assignments(
    &self,
    session_id: Uuid,
    assignments: Vec<Assignment>,
    at: DateTime<Utc>,
  ) -> Result<CommitOutcome> {
    let session_str = encode_uuid(session_id);
    let at_str = encode_dt(at);
    let pairs: Vec<(String, String)> = assignments
      .iter()
      .map(|a| (encode_uuid(a.giver_id), encode_uuid(a.recipient_id)))
      .collect();

    let seen = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let state: Option<(String, Option<String>)> = tx
          .query_row(
            "SELECT status, assigned_at FROM sessions WHERE session_id = ?1",
            rusqlite::params![session_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;
        let Some((status, assigned_at)) = state else {
          return Ok(RawCommit::Missing);
        };
        let drawable = status == encode_status(SessionStatus::Open)
          || status == encode_status(SessionStatus::Locked);
        if !drawable || assigned_at.is_some() {
          return Ok(RawCommit::Rejected(status));
        }

        let current: HashSet<String> = {
          let mut stmt =
            tx.prepare("SELECT participant_id FROM participants WHERE session_id = ?1")?;
          stmt
            .query_map(rusqlite::params![session_str], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?
        };
        let givers: HashSet<&String> = pairs.iter().map(|(giver, _)| giver).collect();
        if givers.len() != pairs.len()
          || current.len() != givers.len()
          || !current.iter().all(|id| givers.contains(id))
        {
          return Ok(RawCommit::Changed);
        }

        {
          let mut stmt = tx.prepare(
            "UPDATE participants SET assigned_to = ?3
             WHERE session_id = ?1 AND participant_id = ?2",
          )?;
          for (giver, recipient) in &pairs {
            stmt.execute(rusqlite::params![session_str, giver, recipient])?;
          }
        }
        tx.execute(
          "UPDATE sessions SET status = ?2, assigned_at = ?3 WHERE session_id = ?1",
          rusqlite::params![
            session_str,
            encode_status(SessionStatus::Locked),
            at_str
          ],
        )?;

        let Some(raw) = select_session(&tx, &session_str)? else {
          return Ok(RawCommit::Missing);
        };
        tx.commit()?;
        Ok(RawCommit::Committed(raw))
      })
      .await?;

    Ok(match seen {
      RawCommit::Missing => CommitOutcome::SessionMissing,
      RawCommit::Rejected(status) => CommitOutcome::Rejected(decode_status(&status)?),
      RawCommit::Changed => CommitOutcome::ParticipantsChanged,
      RawCommit::Committed(raw) => CommitOutcome::Committed(raw.into_session()?),
    })
  }
}
