//! HTTP Basic authentication against the configured accounts.
//!
//! The middleware never rejects a request for lacking credentials: public
//! routes (joining, invite lookup, webhooks) must stay reachable. It only
//! attaches a [`Caller`] when credentials verify, and answers 401 when they
//! are present but wrong.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use santa_api::{ApiError, Caller};
use santa_core::AccountId;

use crate::{AccountConfig, Error, Result};

/// The accounts allowed to create and manage sessions.
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
  accounts: Vec<AccountConfig>,
}

impl AccountDirectory {
  pub fn new(accounts: Vec<AccountConfig>) -> Self { Self { accounts } }

  /// Resolve the `Authorization` header to an account.
  ///
  /// `Ok(None)` means no credentials were offered.
  pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<AccountId>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
      return Ok(None);
    };
    let encoded = value
      .to_str()
      .ok()
      .and_then(|v| v.strip_prefix("Basic "))
      .ok_or(Error::MalformedCredentials)?;

    let decoded = B64.decode(encoded).map_err(|_| Error::MalformedCredentials)?;
    let creds = std::str::from_utf8(&decoded).map_err(|_| Error::MalformedCredentials)?;
    let (username, password) = creds.split_once(':').ok_or(Error::MalformedCredentials)?;

    let account = self
      .accounts
      .iter()
      .find(|a| a.username == username)
      .ok_or(Error::InvalidCredentials)?;

    let parsed_hash = PasswordHash::new(&account.password_hash)
      .map_err(|_| Error::InvalidCredentials)?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| Error::InvalidCredentials)?;

    Ok(Some(account.id))
  }
}

/// `axum::middleware::from_fn_with_state` layer attaching a [`Caller`].
pub async fn attach_caller(
  State(directory): State<Arc<AccountDirectory>>,
  mut req: Request,
  next: Next,
) -> Response {
  match directory.authenticate(req.headers()) {
    Ok(Some(id)) => {
      req.extensions_mut().insert(Caller(id));
      next.run(req).await
    }
    Ok(None) => next.run(req).await,
    Err(e) => {
      tracing::debug!(error = %e, "rejected credentials");
      ApiError::Unauthenticated.into_response()
    }
  }
}
