//! Plan tiers and the limits they impose.
//!
//! The policy is a pure lookup: nothing here touches storage. Callers pass in
//! the counts they observed and get back either `Ok(())` or the limit that
//! would be exceeded.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The tier a session was created under.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
  #[default]
  Free,
  Group,
  Business,
}

/// Limits and pricing attached to a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
  /// Participants allowed in one session. `None` = unlimited.
  pub max_participants:  Option<u32>,
  /// Sessions a creator may have in an active status at once.
  /// `None` = unlimited.
  pub max_active_events: Option<u32>,
  /// One-off price in euro cents; zero means no checkout is needed.
  pub price_cents:       u32,
  pub features:          &'static [&'static str],
}

impl Plan {
  pub const ALL: [Plan; 3] = [Plan::Free, Plan::Group, Plan::Business];

  /// | Plan | Participants | Active events | Price |
  /// |------|--------------|---------------|-------|
  /// | Free | 15 | 1 | €0 |
  /// | Group | 50 | 5 | €4 |
  /// | Business | unlimited | unlimited | €10 |
  pub fn limits(self) -> PlanLimits {
    match self {
      Plan::Free => PlanLimits {
        max_participants:  Some(15),
        max_active_events: Some(1),
        price_cents:       0,
        features:          &[
          "Basic matching algorithm",
          "Email notifications",
          "Gift preferences & wishlists",
          "Up to 15 participants",
          "1 event at a time",
        ],
      },
      Plan::Group => PlanLimits {
        max_participants:  Some(50),
        max_active_events: Some(5),
        price_cents:       400,
        features:          &[
          "Smart matching algorithm",
          "Custom event themes",
          "Gift preferences & wishlists",
          "Up to 50 participants",
          "Budget setting",
        ],
      },
      Plan::Business => PlanLimits {
        max_participants:  None,
        max_active_events: None,
        price_cents:       1000,
        features:          &[
          "Advanced matching algorithm",
          "Custom branding",
          "Gift preferences & wishlists",
          "Unlimited participants",
          "Budget management",
          "Priority support",
        ],
      },
    }
  }

  /// Paid plans start in `PendingPayment` and open once checkout completes.
  pub fn requires_payment(self) -> bool { self.limits().price_cents > 0 }

  pub fn as_str(self) -> &'static str {
    match self {
      Plan::Free => "FREE",
      Plan::Group => "GROUP",
      Plan::Business => "BUSINESS",
    }
  }

  /// Fails when a session already holding `current` participants may not
  /// accept another one.
  pub fn check_participant_capacity(
    self,
    current: usize,
  ) -> Result<(), PlanLimitError> {
    match self.limits().max_participants {
      Some(max) if current >= max as usize => {
        Err(PlanLimitError::Participants { plan: self, max })
      }
      _ => Ok(()),
    }
  }

  /// Fails when a creator with `active` sessions may not open another one on
  /// this plan.
  pub fn check_active_sessions(self, active: u32) -> Result<(), PlanLimitError> {
    match self.limits().max_active_events {
      Some(max) if active >= max => {
        Err(PlanLimitError::ActiveSessions { plan: self, max })
      }
      _ => Ok(()),
    }
  }
}

impl fmt::Display for Plan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A plan limit that an operation would have exceeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanLimitError {
  #[error("the {plan} plan allows at most {max} participants per session")]
  Participants { plan: Plan, max: u32 },

  #[error("the {plan} plan allows at most {max} active sessions at a time")]
  ActiveSessions { plan: Plan, max: u32 },
}
