//! Actions and the flows that trigger them.

use serde::{Deserialize, Serialize};

/// Actions move between active and inactive freely; removal is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl ActionState {
    pub fn exists(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    ExternalAuthentication,
    InternalAuthentication,
    CustomiseToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PostAuthentication,
    PreCreation,
    PostCreation,
    PreUserinfoCreation,
    PreAccessTokenCreation,
}
