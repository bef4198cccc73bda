//! Project aggregate events. Applications are sub-entities on the project
//! aggregate, addressed by `app_id` in every payload.

use serde::{Deserialize, Serialize};

use idforge_core::AppId;
use idforge_events::EventType;

use crate::application::{ApiAuthMethod, OidcAppType, OidcAuthMethod, OidcGrantType, OidcResponseType};
use crate::project::PrivateLabelingSetting;

pub const PROJECT_ADDED: EventType = EventType::from_static("project.added");
pub const PROJECT_CHANGED: EventType = EventType::from_static("project.changed");
pub const PROJECT_DEACTIVATED: EventType = EventType::from_static("project.deactivated");
pub const PROJECT_REACTIVATED: EventType = EventType::from_static("project.reactivated");
pub const PROJECT_REMOVED: EventType = EventType::from_static("project.removed");
pub const PROJECT_ROLE_ADDED: EventType = EventType::from_static("project.role.added");
pub const PROJECT_ROLE_CHANGED: EventType = EventType::from_static("project.role.changed");
pub const PROJECT_ROLE_REMOVED: EventType = EventType::from_static("project.role.removed");
pub const APPLICATION_ADDED: EventType = EventType::from_static("project.application.added");
pub const APPLICATION_CHANGED: EventType = EventType::from_static("project.application.changed");
pub const APPLICATION_DEACTIVATED: EventType =
    EventType::from_static("project.application.deactivated");
pub const APPLICATION_REACTIVATED: EventType =
    EventType::from_static("project.application.reactivated");
pub const APPLICATION_REMOVED: EventType = EventType::from_static("project.application.removed");
pub const APPLICATION_OIDC_CONFIG_ADDED: EventType =
    EventType::from_static("project.application.config.oidc.added");
pub const APPLICATION_OIDC_CONFIG_CHANGED: EventType =
    EventType::from_static("project.application.config.oidc.changed");
pub const APPLICATION_OIDC_SECRET_CHANGED: EventType =
    EventType::from_static("project.application.config.oidc.secret.changed");
pub const APPLICATION_API_CONFIG_ADDED: EventType =
    EventType::from_static("project.application.config.api.added");
pub const APPLICATION_API_CONFIG_CHANGED: EventType =
    EventType::from_static("project.application.config.api.changed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAdded {
    pub name: String,
    #[serde(default)]
    pub project_role_assertion: bool,
    #[serde(default)]
    pub project_role_check: bool,
    #[serde(default)]
    pub has_project_check: bool,
    #[serde(default)]
    pub private_labeling_setting: PrivateLabelingSetting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectChanged {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_role_assertion: Option<bool>,
    #[serde(default)]
    pub project_role_check: Option<bool>,
    #[serde(default)]
    pub has_project_check: Option<bool>,
    #[serde(default)]
    pub private_labeling_setting: Option<PrivateLabelingSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoleAdded {
    pub key: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoleChanged {
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoleRemoved {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationAdded {
    pub app_id: AppId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationChanged {
    pub app_id: AppId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStateChanged {
    pub app_id: AppId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfigAdded {
    pub app_id: AppId,
    pub client_id: String,
    /// SHA-256 of the generated secret; empty for public clients.
    #[serde(default)]
    pub client_secret_digest: String,
    pub redirect_uris: Vec<String>,
    pub response_types: Vec<OidcResponseType>,
    pub grant_types: Vec<OidcGrantType>,
    pub app_type: OidcAppType,
    pub auth_method: OidcAuthMethod,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub dev_mode: bool,
    /// Unix seconds; zero means the secret never expires.
    #[serde(default)]
    pub client_secret_expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfigChanged {
    pub app_id: AppId,
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub response_types: Option<Vec<OidcResponseType>>,
    #[serde(default)]
    pub grant_types: Option<Vec<OidcGrantType>>,
    #[serde(default)]
    pub app_type: Option<OidcAppType>,
    #[serde(default)]
    pub auth_method: Option<OidcAuthMethod>,
    #[serde(default)]
    pub post_logout_redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcSecretChanged {
    pub app_id: AppId,
    pub client_secret_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfigAdded {
    pub app_id: AppId,
    pub client_id: String,
    #[serde(default)]
    pub client_secret_digest: String,
    pub auth_method: ApiAuthMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfigChanged {
    pub app_id: AppId,
    pub auth_method: ApiAuthMethod,
}
