//! IDP aggregate events. Each configured provider is its own aggregate,
//! owned by an org or by the instance.

use serde::{Deserialize, Serialize};

use idforge_events::EventType;

use crate::idp::{IdpConfig, ProvisioningOptions};

pub const IDP_ADDED: EventType = EventType::from_static("idp.added");
pub const IDP_CHANGED: EventType = EventType::from_static("idp.changed");
pub const IDP_CONFIG_CHANGED: EventType = EventType::from_static("idp.config.changed");
pub const IDP_REMOVED: EventType = EventType::from_static("idp.removed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpAdded {
    pub name: String,
    pub config: IdpConfig,
    #[serde(default)]
    pub options: ProvisioningOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpChanged {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Option<ProvisioningOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpConfigChanged {
    pub config: IdpConfig,
}
