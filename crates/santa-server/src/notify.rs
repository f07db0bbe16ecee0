//! Assignment notifiers: a log writer for deployments without mail, and the
//! [`Mailer`] the binary picks between it and SMTP at startup.
//!
//! Each notice carries the participant's dashboard link, which is all an
//! email would contain.

use std::convert::Infallible;

use santa_core::{notify::Notifier, participant::Participant};

use crate::mail::{MailError, SmtpNotifier};

#[derive(Debug, Clone)]
pub struct LogNotifier {
  public_url: String,
}

impl LogNotifier {
  pub fn new(public_url: impl Into<String>) -> Self {
    Self { public_url: public_url.into() }
  }

  pub fn dashboard_url(&self, participant: &Participant) -> String {
    dashboard_url(&self.public_url, participant)
  }
}

/// Where `participant` sees their recipient and edits preferences.
pub fn dashboard_url(public_url: &str, participant: &Participant) -> String {
  format!(
    "{}/sessions/{}/participants/{}",
    public_url.trim_end_matches('/'),
    participant.session_id,
    participant.participant_id,
  )
}

impl Notifier for LogNotifier {
  type Error = Infallible;

  async fn send_assignment(
    &self,
    giver: &Participant,
    recipient_name: &str,
  ) -> Result<(), Infallible> {
    tracing::info!(
      to = %giver.email,
      session_id = %giver.session_id,
      recipient = recipient_name,
      link = %self.dashboard_url(giver),
      "assignment notice"
    );
    Ok(())
  }
}

/// The notifier chosen from configuration.
#[derive(Debug, Clone)]
pub enum Mailer {
  Smtp(SmtpNotifier),
  Log(LogNotifier),
}

impl Notifier for Mailer {
  type Error = MailError;

  async fn send_assignment(
    &self,
    giver: &Participant,
    recipient_name: &str,
  ) -> Result<(), MailError> {
    match self {
      Mailer::Smtp(smtp) => smtp.send_assignment(giver, recipient_name).await,
      Mailer::Log(log) => {
        let Ok(()) = log.send_assignment(giver, recipient_name).await;
        Ok(())
      }
    }
  }
}
