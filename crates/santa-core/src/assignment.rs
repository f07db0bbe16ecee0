//! Drawing givers and recipients, and reporting how delivery went.
//!
//! A draw is a uniformly shuffled ring: after shuffling, the participant at
//! position `i` gives to the one at position `(i + 1) % n`. That yields a
//! permutation with no fixed points which is also a single cycle, so nobody
//! draws themselves and no closed pairs form inside a larger group.

use std::fmt;

use futures::future::join_all;
use rand::{Rng, seq::SliceRandom as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  notify::Notifier,
  participant::Participant,
  session::Session,
};

/// One edge of a draw: `giver_id` buys for `recipient_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
  pub giver_id:     Uuid,
  pub recipient_id: Uuid,
}

/// Draw a single-cycle derangement over `ids`.
///
/// The order of `ids` does not matter. The same ids and the same RNG state
/// always produce the same draw.
pub fn draw<R: Rng + ?Sized>(ids: &[Uuid], rng: &mut R) -> Result<Vec<Assignment>> {
  if ids.len() < 2 {
    return Err(Error::InsufficientParticipants(ids.len()));
  }

  let mut ring = ids.to_vec();
  ring.shuffle(rng);

  let n = ring.len();
  Ok(
    (0..n)
      .map(|i| Assignment {
        giver_id:     ring[i],
        recipient_id: ring[(i + 1) % n],
      })
      .collect(),
  )
}

// ─── Notification reporting ──────────────────────────────────────────────────

/// A single assignment message that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFailure {
  pub participant_id: Uuid,
  pub email:          String,
  pub reason:         String,
}

/// Attached to a successful draw when some messages were not delivered.
/// The assignments themselves stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialNotificationFailure {
  pub attempted: usize,
  pub failures:  Vec<NotificationFailure>,
}

impl fmt::Display for PartialNotificationFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "assignments created; {} of {} emails failed to send",
      self.failures.len(),
      self.attempted
    )
  }
}

/// Result of [`crate::lifecycle::Lifecycle::lock_and_assign`].
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
  /// The session after the draw (`Locked`, with `assigned_at` set).
  pub session:         Session,
  pub assignments:     Vec<Assignment>,
  /// Messages delivered successfully.
  pub notified:        usize,
  pub partial_failure: Option<PartialNotificationFailure>,
}

/// Send every giver the name of their recipient, concurrently, and wait for
/// all sends to settle.
///
/// `participants` must contain every giver and recipient named in
/// `assignments`. Returns the number delivered and a failure report if any
/// send failed.
pub async fn notify_all<N: Notifier>(
  notifier: &N,
  participants: &[Participant],
  assignments: &[Assignment],
) -> (usize, Option<PartialNotificationFailure>) {
  let find =
    |id: Uuid| participants.iter().find(|p| p.participant_id == id);

  let pairs: Vec<(&Participant, &Participant)> = assignments
    .iter()
    .filter_map(|a| Some((find(a.giver_id)?, find(a.recipient_id)?)))
    .collect();

  let results = join_all(pairs.iter().map(|(giver, recipient)| {
    notifier.send_assignment(giver, &recipient.name)
  }))
  .await;

  let failures: Vec<NotificationFailure> = pairs
    .iter()
    .zip(results)
    .filter_map(|((giver, _), result)| {
      result.err().map(|err| NotificationFailure {
        participant_id: giver.participant_id,
        email:          giver.email.clone(),
        reason:         err.to_string(),
      })
    })
    .collect();

  let attempted = pairs.len();
  let notified = attempted - failures.len();
  let report = (!failures.is_empty())
    .then_some(PartialNotificationFailure { attempted, failures });
  (notified, report)
}
