//! Errors raised by the server's own adapters: authentication and the
//! payment gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed authorization header")]
  MalformedCredentials,
  #[error("invalid username or password")]
  InvalidCredentials,
  #[error("payments are not configured")]
  PaymentsDisabled,
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("stripe returned {status}: {body}")]
  Stripe { status: u16, body: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
