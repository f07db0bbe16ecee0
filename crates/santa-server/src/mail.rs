//! SMTP delivery of assignment notices via `lettre`.

use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
  message::{Mailbox, header::ContentType},
  transport::smtp::authentication::Credentials,
};
use santa_core::{notify::Notifier, participant::Participant};
use thiserror::Error;

use crate::{SmtpConfig, notify::dashboard_url};

#[derive(Debug, Error)]
pub enum MailError {
  #[error("smtp transport error: {0}")]
  Transport(#[from] lettre::transport::smtp::Error),
  #[error("invalid address: {0}")]
  Address(#[from] lettre::address::AddressError),
  #[error("failed to build message: {0}")]
  Build(#[from] lettre::error::Error),
}

/// Sends each giver a plain-text email naming their recipient.
#[derive(Clone)]
pub struct SmtpNotifier {
  mailer:     AsyncSmtpTransport<Tokio1Executor>,
  from:       Mailbox,
  public_url: String,
}

impl std::fmt::Debug for SmtpNotifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SmtpNotifier")
      .field("from", &self.from)
      .field("public_url", &self.public_url)
      .finish_non_exhaustive()
  }
}

impl SmtpNotifier {
  /// Build a STARTTLS transport from configuration. No connection is made
  /// until the first message is sent.
  pub fn new(
    cfg: &SmtpConfig,
    public_url: impl Into<String>,
  ) -> Result<Self, MailError> {
    let mut builder =
      AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
        .port(cfg.port);
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
      builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    Ok(Self {
      mailer:     builder.build(),
      from:       cfg.from.parse()?,
      public_url: public_url.into(),
    })
  }

  /// The email `giver` receives once assignments are drawn.
  pub fn message(
    &self,
    giver: &Participant,
    recipient_name: &str,
  ) -> Result<Message, MailError> {
    let to = Mailbox::new(Some(giver.name.clone()), giver.email.parse()?);
    let body = format!(
      "Hi {},\n\nNames have been drawn. You are buying a gift for {}.\n\n\
       See their wishlist and sizes here:\n{}\n",
      giver.name,
      recipient_name,
      dashboard_url(&self.public_url, giver),
    );

    Ok(
      Message::builder()
        .from(self.from.clone())
        .to(to)
        .subject("Your Secret Santa assignment")
        .header(ContentType::TEXT_PLAIN)
        .body(body)?,
    )
  }
}

impl Notifier for SmtpNotifier {
  type Error = MailError;

  async fn send_assignment(
    &self,
    giver: &Participant,
    recipient_name: &str,
  ) -> Result<(), MailError> {
    let email = self.message(giver, recipient_name)?;
    self.mailer.send(email).await?;
    tracing::info!(
      to = %giver.email,
      session_id = %giver.session_id,
      "assignment email sent"
    );
    Ok(())
  }
}
