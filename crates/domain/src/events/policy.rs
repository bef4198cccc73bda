//! Policy events, both levels.
//!
//! Instance defaults live on the instance aggregate, org overrides on the
//! org aggregate. The payloads are the shared policy structs; add/changed
//! carry the full policy, removed (org only) drops the override.

use serde::{Deserialize, Serialize};

use idforge_events::EventType;

use crate::policy::{MultiFactorType, SecondFactorType};

// Instance defaults.
pub const INSTANCE_LOGIN_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.login.added");
pub const INSTANCE_LOGIN_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.login.changed");
pub const INSTANCE_LOGIN_POLICY_SECOND_FACTOR_ADDED: EventType =
    EventType::from_static("instance.policy.login.second_factor.added");
pub const INSTANCE_LOGIN_POLICY_SECOND_FACTOR_REMOVED: EventType =
    EventType::from_static("instance.policy.login.second_factor.removed");
pub const INSTANCE_LOGIN_POLICY_MULTI_FACTOR_ADDED: EventType =
    EventType::from_static("instance.policy.login.multi_factor.added");
pub const INSTANCE_LOGIN_POLICY_MULTI_FACTOR_REMOVED: EventType =
    EventType::from_static("instance.policy.login.multi_factor.removed");
pub const INSTANCE_PASSWORD_COMPLEXITY_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.password_complexity.added");
pub const INSTANCE_PASSWORD_COMPLEXITY_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.password_complexity.changed");
pub const INSTANCE_PASSWORD_AGE_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.password_age.added");
pub const INSTANCE_PASSWORD_AGE_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.password_age.changed");
pub const INSTANCE_LOCKOUT_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.lockout.added");
pub const INSTANCE_LOCKOUT_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.lockout.changed");
pub const INSTANCE_PRIVACY_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.privacy.added");
pub const INSTANCE_PRIVACY_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.privacy.changed");
pub const INSTANCE_LABEL_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.label.added");
pub const INSTANCE_LABEL_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.label.changed");
pub const INSTANCE_DOMAIN_POLICY_ADDED: EventType =
    EventType::from_static("instance.policy.domain.added");
pub const INSTANCE_DOMAIN_POLICY_CHANGED: EventType =
    EventType::from_static("instance.policy.domain.changed");
pub const INSTANCE_SECURITY_POLICY_SET: EventType =
    EventType::from_static("instance.policy.security.set");

// Org overrides.
pub const ORG_LOGIN_POLICY_ADDED: EventType = EventType::from_static("org.policy.login.added");
pub const ORG_LOGIN_POLICY_CHANGED: EventType = EventType::from_static("org.policy.login.changed");
pub const ORG_LOGIN_POLICY_REMOVED: EventType = EventType::from_static("org.policy.login.removed");
pub const ORG_LOGIN_POLICY_SECOND_FACTOR_ADDED: EventType =
    EventType::from_static("org.policy.login.second_factor.added");
pub const ORG_LOGIN_POLICY_SECOND_FACTOR_REMOVED: EventType =
    EventType::from_static("org.policy.login.second_factor.removed");
pub const ORG_LOGIN_POLICY_MULTI_FACTOR_ADDED: EventType =
    EventType::from_static("org.policy.login.multi_factor.added");
pub const ORG_LOGIN_POLICY_MULTI_FACTOR_REMOVED: EventType =
    EventType::from_static("org.policy.login.multi_factor.removed");
pub const ORG_PASSWORD_COMPLEXITY_POLICY_ADDED: EventType =
    EventType::from_static("org.policy.password_complexity.added");
pub const ORG_PASSWORD_COMPLEXITY_POLICY_CHANGED: EventType =
    EventType::from_static("org.policy.password_complexity.changed");
pub const ORG_PASSWORD_COMPLEXITY_POLICY_REMOVED: EventType =
    EventType::from_static("org.policy.password_complexity.removed");
pub const ORG_PASSWORD_AGE_POLICY_ADDED: EventType =
    EventType::from_static("org.policy.password_age.added");
pub const ORG_PASSWORD_AGE_POLICY_CHANGED: EventType =
    EventType::from_static("org.policy.password_age.changed");
pub const ORG_PASSWORD_AGE_POLICY_REMOVED: EventType =
    EventType::from_static("org.policy.password_age.removed");
pub const ORG_LOCKOUT_POLICY_ADDED: EventType =
    EventType::from_static("org.policy.lockout.added");
pub const ORG_LOCKOUT_POLICY_CHANGED: EventType =
    EventType::from_static("org.policy.lockout.changed");
pub const ORG_LOCKOUT_POLICY_REMOVED: EventType =
    EventType::from_static("org.policy.lockout.removed");
pub const ORG_PRIVACY_POLICY_ADDED: EventType =
    EventType::from_static("org.policy.privacy.added");
pub const ORG_PRIVACY_POLICY_CHANGED: EventType =
    EventType::from_static("org.policy.privacy.changed");
pub const ORG_PRIVACY_POLICY_REMOVED: EventType =
    EventType::from_static("org.policy.privacy.removed");
pub const ORG_LABEL_POLICY_ADDED: EventType = EventType::from_static("org.policy.label.added");
pub const ORG_LABEL_POLICY_CHANGED: EventType = EventType::from_static("org.policy.label.changed");
pub const ORG_LABEL_POLICY_REMOVED: EventType = EventType::from_static("org.policy.label.removed");
pub const ORG_DOMAIN_POLICY_ADDED: EventType = EventType::from_static("org.policy.domain.added");
pub const ORG_DOMAIN_POLICY_CHANGED: EventType =
    EventType::from_static("org.policy.domain.changed");
pub const ORG_DOMAIN_POLICY_REMOVED: EventType =
    EventType::from_static("org.policy.domain.removed");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondFactorPayload {
    pub factor: SecondFactorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFactorPayload {
    pub factor: MultiFactorType,
}

/// Org policy removal events carry no payload; the empty struct keeps the
/// codec uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyRemoved {}
