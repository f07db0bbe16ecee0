//! Participants and their optional gift preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail as _;

use crate::{Error, Result};

/// A person enrolled in exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
  pub participant_id: Uuid,
  pub session_id:     Uuid,
  pub name:           String,
  /// Stored trimmed and lowercased; unique within a session.
  pub email:          String,
  pub preferences:    Option<Preferences>,
  /// The participant this one buys a gift for. Always another participant of
  /// the same session.
  pub assigned_to:    Option<Uuid>,
  pub joined_at:      DateTime<Utc>,
}

/// Input to [`crate::lifecycle::Lifecycle::join_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParticipant {
  pub name:  String,
  pub email: String,
}

impl NewParticipant {
  /// Trim both fields, lowercase the email and check both are usable.
  pub fn normalized(self) -> Result<Self> {
    let name = self.name.trim().to_owned();
    let email = self.email.trim().to_lowercase();
    if name.is_empty() {
      return Err(Error::Validation("participant name must not be empty".into()));
    }
    if !email.validate_email() {
      return Err(Error::Validation(format!("{email:?} is not a valid email")));
    }
    Ok(Self { name, email })
  }
}

// ─── Preferences ─────────────────────────────────────────────────────────────

/// Hints a giver can use when shopping. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
  pub interests:       Vec<String>,
  pub sizes:           Sizes,
  pub wishlist:        Vec<String>,
  pub restrictions:    Vec<String>,
  pub age_group:       Option<AgeGroup>,
  pub gender:          Option<Gender>,
  pub favorite_colors: Vec<String>,
  pub dislikes:        Vec<String>,
  pub hobbies:         Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sizes {
  pub clothing: Option<ClothingSize>,
  /// EU shoe size, 36 to 45.
  pub shoe:     Option<u8>,
  /// US ring size, 5 to 10.
  pub ring:     Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClothingSize {
  Xs,
  S,
  M,
  L,
  Xl,
  Xxl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
  #[serde(rename = "18-25")]
  From18To25,
  #[serde(rename = "26-35")]
  From26To35,
  #[serde(rename = "36-45")]
  From36To45,
  #[serde(rename = "46-55")]
  From46To55,
  #[serde(rename = "56+")]
  Over55,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
  Male,
  Female,
  NonBinary,
  PreferNotToSay,
}

impl Preferences {
  pub fn validate(&self) -> Result<()> {
    if let Some(shoe) = self.sizes.shoe
      && !(36..=45).contains(&shoe)
    {
      return Err(Error::Validation(format!(
        "shoe size {shoe} is outside 36-45"
      )));
    }
    if let Some(ring) = self.sizes.ring
      && !(5..=10).contains(&ring)
    {
      return Err(Error::Validation(format!(
        "ring size {ring} is outside 5-10"
      )));
    }
    Ok(())
  }
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// What a participant sees on their own dashboard: their record and, once
/// drawn, who they are buying for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
  pub participant: Participant,
  pub recipient:   Option<RecipientView>,
}

/// The part of the recipient a giver is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientView {
  pub participant_id: Uuid,
  pub name:           String,
  pub preferences:    Option<Preferences>,
}

impl From<&Participant> for RecipientView {
  fn from(p: &Participant) -> Self {
    Self {
      participant_id: p.participant_id,
      name:           p.name.clone(),
      preferences:    p.preferences.clone(),
    }
  }
}
