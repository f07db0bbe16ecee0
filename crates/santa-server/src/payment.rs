//! Stripe-backed [`PaymentGateway`].
//!
//! Checkouts are one-off payments of the plan price in euro, tagged with the
//! session id in their metadata. Webhook deliveries are authenticated with
//! the `Stripe-Signature` scheme: `t=<unix>,v1=<hex hmac>` where the MAC is
//! HMAC-SHA256 over `"{t}.{body}"` keyed by the endpoint secret.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use santa_core::{
  payment::{CheckoutHandle, PaymentEvent, PaymentGateway, VerificationError},
  session::Session,
};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{Error, PaymentConfig, Result};

/// Deliveries older (or further in the future) than this are refused.
const SIGNATURE_TOLERANCE_SECS: u64 = 300;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

type HmacSha256 = Hmac<Sha256>;

pub struct StripeGateway {
  config: Option<PaymentConfig>,
  http:   reqwest::Client,
}

impl StripeGateway {
  /// A gateway without configuration refuses every checkout and webhook.
  pub fn new(config: Option<PaymentConfig>) -> Self {
    Self { config, http: reqwest::Client::new() }
  }

  fn config(&self) -> Result<&PaymentConfig> {
    self.config.as_ref().ok_or(Error::PaymentsDisabled)
  }

  /// Verify against an explicit "now" (unix seconds).
  pub fn verify_at(
    &self,
    header: &str,
    payload: &[u8],
    now: i64,
  ) -> Result<PaymentEvent, VerificationError> {
    let config = self
      .config()
      .map_err(|e| VerificationError(e.to_string()))?;
    let signature = SignatureHeader::parse(header)?;

    // `t=` is caller-controlled and may sit anywhere in the i64 range.
    let skew = now.checked_sub(signature.timestamp).map(i64::unsigned_abs);
    if !skew.is_some_and(|s| s <= SIGNATURE_TOLERANCE_SECS) {
      return Err(VerificationError("timestamp outside tolerance".into()));
    }

    let expected = sign(&config.webhook_secret, signature.timestamp, payload);
    let matched = signature
      .v1
      .iter()
      .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate)));
    if !matched {
      return Err(VerificationError("signature mismatch".into()));
    }

    parse_event(payload)
  }
}

impl PaymentGateway for StripeGateway {
  type Error = Error;

  async fn create_checkout(&self, session: &Session) -> Result<CheckoutHandle> {
    let config = self.config()?;
    let price_cents = session.plan.limits().price_cents;
    let url = format!("{}/v1/checkout/sessions", config.api_base.trim_end_matches('/'));

    let params = [
      ("mode", "payment".to_string()),
      ("line_items[0][quantity]", "1".to_string()),
      ("line_items[0][price_data][currency]", "eur".to_string()),
      ("line_items[0][price_data][unit_amount]", price_cents.to_string()),
      (
        "line_items[0][price_data][product_data][name]",
        format!("{} plan: {}", session.plan, session.name),
      ),
      ("success_url", config.success_url.clone()),
      ("cancel_url", config.cancel_url.clone()),
      ("metadata[session_id]", session.session_id.to_string()),
    ];

    let response = self
      .http
      .post(&url)
      .basic_auth(&config.secret_key, Option::<&str>::None)
      .form(&params)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      tracing::error!(status = status.as_u16(), %body, "stripe checkout failed");
      return Err(Error::Stripe { status: status.as_u16(), body });
    }

    let created: CheckoutObject = response.json().await?;
    Ok(CheckoutHandle { reference: created.id, url: created.url })
  }

  fn verify_and_parse(
    &self,
    signature: &str,
    payload: &[u8],
  ) -> Result<PaymentEvent, VerificationError> {
    self.verify_at(signature, payload, chrono::Utc::now().timestamp())
  }
}

// ─── Signatures ──────────────────────────────────────────────────────────────

struct SignatureHeader {
  timestamp: i64,
  /// Stripe sends several `v1` entries while a secret is being rolled.
  v1:        Vec<Vec<u8>>,
}

impl SignatureHeader {
  fn parse(header: &str) -> Result<Self, VerificationError> {
    let mut timestamp = None;
    let mut v1 = Vec::new();
    for part in header.split(',') {
      let Some((key, value)) = part.trim().split_once('=') else {
        return Err(VerificationError("malformed signature header".into()));
      };
      match key {
        "t" => {
          timestamp = Some(
            value
              .parse()
              .map_err(|_| VerificationError("invalid timestamp".into()))?,
          );
        }
        "v1" => v1.push(
          hex::decode(value)
            .map_err(|_| VerificationError("invalid v1 signature hex".into()))?,
        ),
        _ => {}
      }
    }
    let timestamp =
      timestamp.ok_or_else(|| VerificationError("missing timestamp".into()))?;
    if v1.is_empty() {
      return Err(VerificationError("missing v1 signature".into()));
    }
    Ok(Self { timestamp, v1 })
  }
}

fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .expect("HMAC can take key of any size");
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(payload);
  mac.finalize().into_bytes().to_vec()
}

/// Value for a `Stripe-Signature` header over `payload`.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
  format!("t={timestamp},v1={}", hex::encode(sign(secret, timestamp, payload)))
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StripeEvent {
  #[serde(rename = "type")]
  event_type: String,
  data:       StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
  object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutObject {
  id:       String,
  #[serde(default)]
  url:      Option<String>,
  #[serde(default)]
  metadata: HashMap<String, String>,
}

fn parse_event(payload: &[u8]) -> Result<PaymentEvent, VerificationError> {
  let event: StripeEvent = serde_json::from_slice(payload)
    .map_err(|e| VerificationError(format!("invalid event json: {e}")))?;

  if event.event_type != CHECKOUT_COMPLETED {
    return Ok(PaymentEvent::Ignored { event_type: event.event_type });
  }

  let checkout: CheckoutObject = serde_json::from_value(event.data.object)
    .map_err(|e| VerificationError(format!("invalid checkout session: {e}")))?;
  let session_id = checkout
    .metadata
    .get("session_id")
    .ok_or_else(|| VerificationError("checkout has no session_id metadata".into()))?;
  let session_id = Uuid::parse_str(session_id)
    .map_err(|e| VerificationError(format!("invalid session_id metadata: {e}")))?;

  Ok(PaymentEvent::CheckoutCompleted { session_id, reference: checkout.id })
}
