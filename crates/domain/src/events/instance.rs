//! Instance aggregate events.

use serde::{Deserialize, Serialize};

use idforge_core::{DomainName, Language, OrgId};
use idforge_events::EventType;

use crate::instance::FeatureFlags;

pub const INSTANCE_ADDED: EventType = EventType::from_static("instance.added");
pub const INSTANCE_CHANGED: EventType = EventType::from_static("instance.changed");
pub const INSTANCE_REMOVED: EventType = EventType::from_static("instance.removed");
pub const INSTANCE_DEFAULT_ORG_SET: EventType = EventType::from_static("instance.default_org.set");
pub const INSTANCE_DEFAULT_LANGUAGE_SET: EventType =
    EventType::from_static("instance.default_language.set");
pub const INSTANCE_DOMAIN_ADDED: EventType = EventType::from_static("instance.domain.added");
pub const INSTANCE_DOMAIN_PRIMARY_SET: EventType =
    EventType::from_static("instance.domain.primary.set");
pub const INSTANCE_DOMAIN_REMOVED: EventType = EventType::from_static("instance.domain.removed");
pub const INSTANCE_TRUSTED_DOMAIN_ADDED: EventType =
    EventType::from_static("instance.trusted_domain.added");
pub const INSTANCE_TRUSTED_DOMAIN_REMOVED: EventType =
    EventType::from_static("instance.trusted_domain.removed");
pub const INSTANCE_FEATURES_SET: EventType = EventType::from_static("instance.features.set");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAdded {
    pub name: String,
    #[serde(default)]
    pub default_language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceChanged {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultOrgSet {
    pub org_id: OrgId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultLanguageSet {
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDomainAdded {
    pub domain: DomainName,
    /// Generated domains (the instance's own host) cannot be removed.
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDomainPrimarySet {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDomainRemoved {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDomainAdded {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDomainRemoved {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesSet {
    pub features: FeatureFlags,
}
