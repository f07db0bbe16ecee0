//! The `PaymentGateway` trait and the events it yields.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::session::Session;

/// Returned by [`PaymentGateway::create_checkout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutHandle {
  /// Gateway-side identifier; stored on the session and matched against the
  /// completion event.
  pub reference: String,
  /// Where the organiser completes payment, if the gateway hosts a page.
  pub url:       Option<String>,
}

/// A verified event delivered by the gateway's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentEvent {
  CheckoutCompleted { session_id: Uuid, reference: String },
  /// Authentic, but of a type the lifecycle does not act on.
  Ignored { event_type: String },
}

/// The webhook payload could not be authenticated or understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payment event rejected: {0}")]
pub struct VerificationError(pub String);

pub trait PaymentGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Open a checkout for the session's plan price.
  fn create_checkout<'a>(
    &'a self,
    session: &'a Session,
  ) -> impl Future<Output = Result<CheckoutHandle, Self::Error>> + Send + 'a;

  /// Authenticate a raw webhook delivery and decode it.
  fn verify_and_parse(
    &self,
    signature: &str,
    payload: &[u8],
  ) -> Result<PaymentEvent, VerificationError>;
}
