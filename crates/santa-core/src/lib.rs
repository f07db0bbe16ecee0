//! Core types, policies and services for the Santa gift-exchange organiser.
//!
//! This crate has no HTTP or database dependencies. Storage, notification
//! delivery, payments and wall-clock time are reached through the traits in
//! [`store`], [`notify`], [`payment`] and [`clock`]. Their futures are spelled
//! out as `impl Future + Send` so the services stay usable from axum handlers
//! and spawned tasks; implementors can still write plain `async fn`.

pub mod assignment;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod participant;
pub mod payment;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod store;

pub use error::{Error, Result};

/// Identifier of an authenticated account, i.e. a session creator.
pub type AccountId = uuid::Uuid;

#[cfg(test)]
mod memory;
#[cfg(test)]
mod tests;
