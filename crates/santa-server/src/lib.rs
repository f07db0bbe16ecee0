//! Server assembly for the Santa organiser.
//!
//! Wires the SQLite store, a notifier (SMTP or the log) and the Stripe
//! gateway into the JSON API, behind HTTP Basic authentication.

pub mod auth;
pub mod error;
pub mod mail;
pub mod notify;
pub mod payment;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware};
use santa_api::{ApiState, api_router};
use santa_core::{
  AccountId, notify::Notifier, payment::PaymentGateway, store::SessionStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AccountDirectory, attach_caller};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Base URL participants use to reach their dashboard.
  pub public_url:          String,
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_secs: u64,
  #[serde(default)]
  pub accounts:            Vec<AccountConfig>,
  /// Paid plans cannot be checked out without this section.
  #[serde(default)]
  pub payment:             Option<PaymentConfig>,
  /// Assignment notices are only logged without this section.
  #[serde(default)]
  pub smtp:                Option<SmtpConfig>,
}

fn default_sweep_interval() -> u64 { 60 }

/// A creator allowed to sign in.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
  pub id:            AccountId,
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Stripe credentials and redirect targets.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
  pub secret_key:     String,
  pub webhook_secret: String,
  #[serde(default = "default_api_base")]
  pub api_base:       String,
  pub success_url:    String,
  pub cancel_url:     String,
}

fn default_api_base() -> String { "https://api.stripe.com".to_string() }

/// Outgoing mail relay, reached over STARTTLS.
#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
  pub host:     String,
  #[serde(default = "default_smtp_port")]
  pub port:     u16,
  /// Sender mailbox, e.g. `Santa <santa@example.com>`.
  pub from:     String,
  pub username: Option<String>,
  pub password: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router behind Basic authentication and request tracing.
pub fn router<S, N, G>(
  state: ApiState<S, N, G>,
  accounts: Arc<AccountDirectory>,
) -> Router
where
  S: SessionStore + 'static,
  N: Notifier + 'static,
  G: PaymentGateway + 'static,
{
  api_router(state)
    .layer(middleware::from_fn_with_state(accounts, attach_caller))
    .layer(TraceLayer::new_for_http())
}
