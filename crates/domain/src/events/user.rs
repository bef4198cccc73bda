//! User aggregate events: human and machine lifecycle, contact data,
//! external identity links, and personal access tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{EmailAddress, IdpId, PhoneNumber, TokenId};
use idforge_events::EventType;

use crate::user::Profile;

pub const USER_HUMAN_ADDED: EventType = EventType::from_static("user.human.added");
pub const USER_MACHINE_ADDED: EventType = EventType::from_static("user.machine.added");
pub const USER_MACHINE_CHANGED: EventType = EventType::from_static("user.machine.changed");
pub const USER_USERNAME_CHANGED: EventType = EventType::from_static("user.username.changed");
pub const USER_PROFILE_CHANGED: EventType = EventType::from_static("user.profile.changed");
pub const USER_EMAIL_CHANGED: EventType = EventType::from_static("user.email.changed");
pub const USER_EMAIL_VERIFIED: EventType = EventType::from_static("user.email.verified");
pub const USER_PHONE_CHANGED: EventType = EventType::from_static("user.phone.changed");
pub const USER_PHONE_VERIFIED: EventType = EventType::from_static("user.phone.verified");
pub const USER_PHONE_REMOVED: EventType = EventType::from_static("user.phone.removed");
pub const USER_DEACTIVATED: EventType = EventType::from_static("user.deactivated");
pub const USER_REACTIVATED: EventType = EventType::from_static("user.reactivated");
pub const USER_LOCKED: EventType = EventType::from_static("user.locked");
pub const USER_UNLOCKED: EventType = EventType::from_static("user.unlocked");
pub const USER_REMOVED: EventType = EventType::from_static("user.removed");
pub const USER_IDP_LINK_ADDED: EventType = EventType::from_static("user.idp_link.added");
pub const USER_IDP_LINK_REMOVED: EventType = EventType::from_static("user.idp_link.removed");
pub const USER_IDP_EXTERNAL_ID_MIGRATED: EventType =
    EventType::from_static("user.idp_link.external_id.migrated");
pub const USER_IDP_LOGIN_CHECKED: EventType = EventType::from_static("user.idp_login.checked");
pub const USER_PAT_ADDED: EventType = EventType::from_static("user.pat.added");
pub const USER_PAT_REMOVED: EventType = EventType::from_static("user.pat.removed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAdded {
    pub username: String,
    pub profile: Profile,
    pub email: EmailAddress,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub phone_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAdded {
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineChanged {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameChanged {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanged {
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChanged {
    pub email: EmailAddress,
    /// Set when the caller (a verified import or a trusted IDP) vouches for
    /// the address; otherwise verification restarts.
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneChanged {
    pub phone: PhoneNumber,
    #[serde(default)]
    pub verified: bool,
}

/// Username is carried so the org-wide username fold can release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemoved {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLinkAdded {
    pub idp_config_id: IdpId,
    pub external_user_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLinkRemoved {
    pub idp_config_id: IdpId,
    pub external_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpExternalIdMigrated {
    pub idp_config_id: IdpId,
    pub previous_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLoginChecked {
    pub idp_config_id: IdpId,
}

/// Only the digest is persisted; the plaintext token leaves the command
/// engine exactly once, in the command result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalAccessTokenAdded {
    pub token_id: TokenId,
    pub token_digest: String,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalAccessTokenRemoved {
    pub token_id: TokenId,
}
