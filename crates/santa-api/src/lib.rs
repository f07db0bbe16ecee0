//! JSON REST API for the Santa organiser.
//!
//! Exposes an axum [`Router`] over a [`Lifecycle`] backed by any
//! [`SessionStore`], [`Notifier`] and [`PaymentGateway`]. Authentication is
//! the caller's responsibility: an outer layer inserts a [`Caller`] into the
//! request extensions for authenticated requests.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", santa_api::api_router(state))
//! ```

pub mod caller;
pub mod error;
pub mod invite;
pub mod participants;
pub mod sessions;
pub mod webhook;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post},
};
use santa_core::{
  lifecycle::Lifecycle, notify::Notifier, payment::PaymentGateway,
  store::SessionStore,
};

pub use caller::Caller;
pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S, N, G> {
  pub lifecycle: Arc<Lifecycle<S, N>>,
  pub gateway:   Arc<G>,
}

impl<S, N, G> Clone for ApiState<S, N, G> {
  fn clone(&self) -> Self {
    Self {
      lifecycle: self.lifecycle.clone(),
      gateway:   self.gateway.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N, G>(state: ApiState<S, N, G>) -> Router<()>
where
  S: SessionStore + 'static,
  N: Notifier + 'static,
  G: PaymentGateway + 'static,
{
  Router::new()
    // Sessions
    .route(
      "/sessions",
      get(sessions::list::<S, N, G>).post(sessions::create::<S, N, G>),
    )
    .route(
      "/sessions/{id}",
      get(sessions::get_one::<S, N, G>)
        .patch(sessions::update::<S, N, G>)
        .delete(sessions::delete::<S, N, G>),
    )
    .route("/sessions/{id}/status", patch(sessions::update_status::<S, N, G>))
    .route("/sessions/{id}/assignments", post(sessions::assign::<S, N, G>))
    .route("/sessions/{id}/checkout", post(sessions::checkout::<S, N, G>))
    // Participants
    .route(
      "/sessions/{id}/participants",
      get(participants::list::<S, N, G>).post(participants::join::<S, N, G>),
    )
    .route(
      "/sessions/{id}/participants/{pid}",
      get(participants::view::<S, N, G>).delete(participants::remove::<S, N, G>),
    )
    .route(
      "/sessions/{id}/participants/{pid}/preferences",
      patch(participants::update_preferences::<S, N, G>),
    )
    // Public lookups and callbacks
    .route("/invite/{code}", get(invite::lookup::<S, N, G>))
    .route("/webhooks/payment", post(webhook::payment::<S, N, G>))
    .with_state(state)
}
