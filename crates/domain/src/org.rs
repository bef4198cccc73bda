//! Org lifecycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl OrgState {
    pub fn exists(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }
}
