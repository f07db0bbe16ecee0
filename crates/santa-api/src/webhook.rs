//! `POST /webhooks/payment`: checkout callbacks from the payment gateway.
//!
//! The raw body is authenticated by the gateway before anything is parsed.
//! Authentic events the lifecycle does not act on are acknowledged so the
//! gateway stops retrying them.

use axum::{
  Json,
  body::Bytes,
  extract::State,
  http::HeaderMap,
};
use santa_core::{
  notify::Notifier, payment::PaymentGateway, store::SessionStore,
};
use serde_json::{Value, json};

use crate::{ApiState, error::ApiError};

/// Header carrying the gateway's signature over the body.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// `POST /webhooks/payment`
pub async fn payment<S, N, G>(
  State(state): State<ApiState<S, N, G>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: SessionStore,
  N: Notifier,
  G: PaymentGateway,
{
  let signature = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| ApiError::BadRequest(format!("missing {SIGNATURE_HEADER} header")))?;

  let event = state
    .gateway
    .verify_and_parse(signature, &body)
    .map_err(santa_core::Error::from)?;

  let session = state.lifecycle.confirm_payment(event).await?;
  Ok(Json(json!({
    "received": true,
    "session_id": session.map(|s| s.session_id),
  })))
}
