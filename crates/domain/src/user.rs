//! User model: lifecycle states, type, and profile.

use serde::{Deserialize, Serialize};

use idforge_core::Language;

/// User lifecycle.
///
/// Deleted users release their username; inactive and locked users keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Locked,
    Deleted,
}

impl UserState {
    pub fn exists(self) -> bool {
        !matches!(self, Self::Unspecified | Self::Deleted)
    }

    /// Whether the user may authenticate and be mutated.
    pub fn is_enabled(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Human,
    Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unspecified,
    Female,
    Male,
    Diverse,
}

/// Human profile. `display_name` falls back to `first_name last_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub nick_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub preferred_language: Language,
    #[serde(default)]
    pub gender: Gender,
}

impl Profile {
    pub fn display_name_or_default(&self) -> String {
        if self.display_name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            self.display_name.clone()
        }
    }
}
