//! Deadline-driven transitions.
//!
//! A sweep closes registration on open sessions whose deadline has passed
//! and completes locked sessions a day after their exchange. It never draws
//! assignments. Each transition is a compare-and-swap, so sweeps are safe to
//! repeat and to run alongside request handling.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  clock::Clock,
  session::{Session, SessionStatus},
  store::SessionStore,
};

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub locked:    Vec<Uuid>,
  pub completed: Vec<Uuid>,
  pub failures:  Vec<SweepFailure>,
}

/// A step of a sweep that failed. `session_id` is `None` when the store
/// could not even be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
  pub session_id: Option<Uuid>,
  pub error:      String,
}

pub struct Scheduler<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S: SessionStore> Scheduler<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  pub async fn sweep(&self) -> SweepReport {
    let now = self.clock.now();
    let mut report = SweepReport::default();

    report.locked = self
      .advance(
        SessionStatus::Open,
        SessionStatus::Locked,
        |s| s.registration_closed(now),
        &mut report.failures,
      )
      .await;
    report.completed = self
      .advance(
        SessionStatus::Locked,
        SessionStatus::Completed,
        |s| s.due_for_completion(now),
        &mut report.failures,
      )
      .await;

    debug!(
      locked = report.locked.len(),
      completed = report.completed.len(),
      failed = report.failures.len(),
      "sweep finished"
    );
    report
  }

  /// Move every `from` session matching `due` to `to`. Failures are recorded
  /// and skipped.
  async fn advance(
    &self,
    from: SessionStatus,
    to: SessionStatus,
    due: impl Fn(&Session) -> bool,
    failures: &mut Vec<SweepFailure>,
  ) -> Vec<Uuid> {
    let sessions = match self.store.list_sessions_by_status(from).await {
      Ok(sessions) => sessions,
      Err(err) => {
        error!(status = from.as_str(), error = %err, "failed to list sessions");
        failures.push(SweepFailure { session_id: None, error: err.to_string() });
        return Vec::new();
      }
    };

    let mut moved = Vec::new();
    for session in sessions.iter().filter(|s| due(s)) {
      let id = session.session_id;
      match self
        .store
        .transition_status(id, from, to, self.clock.now())
        .await
      {
        Ok(true) => {
          info!(
            session = %id,
            from = from.as_str(),
            to = to.as_str(),
            "scheduled transition"
          );
          moved.push(id);
        }
        // Someone else moved it first.
        Ok(false) => debug!(session = %id, "session already moved"),
        Err(err) => {
          warn!(session = %id, error = %err, "scheduled transition failed");
          failures.push(SweepFailure {
            session_id: Some(id),
            error:      err.to_string(),
          });
        }
      }
    }
    moved
  }
}

impl<S: SessionStore + 'static> Scheduler<S> {
  /// Sweep every `period` on a background task until the task is aborted.
  /// The first sweep runs immediately.
  pub fn spawn(self, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let report = self.sweep().await;
        if !report.failures.is_empty() {
          warn!(failed = report.failures.len(), "sweep had failures");
        }
      }
    })
  }
}
