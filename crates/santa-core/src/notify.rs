//! The `Notifier` trait: delivery of assignment messages.
//!
//! Transport (SMTP, an email API, a log line) is the implementor's concern.
//! The lifecycle only needs to know whether each individual send succeeded.

use std::future::Future;

use crate::participant::Participant;

pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Tell `giver` who they are buying a gift for.
  fn send_assignment<'a>(
    &'a self,
    giver: &'a Participant,
    recipient_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
