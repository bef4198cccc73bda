//! Project model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl ProjectState {
    pub fn exists(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }
}

/// Which branding applies on a project's hosted login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivateLabelingSetting {
    #[default]
    Unspecified,
    EnforceProjectResourceOwnerPolicy,
    AllowLoginUserResourceOwnerPolicy,
}
