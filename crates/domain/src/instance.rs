//! Instance-level settings.

use serde::{Deserialize, Serialize};

/// Feature flags toggled per instance.
///
/// Unknown flags in stored payloads are ignored on read, so adding a field
/// here stays backward compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeatureFlags {
    #[serde(default)]
    pub login_default_org: bool,
    #[serde(default)]
    pub user_schema: bool,
    #[serde(default)]
    pub token_exchange: bool,
    #[serde(default)]
    pub debug_oidc_parent_error: bool,
    #[serde(default)]
    pub disable_user_token_event: bool,
}
