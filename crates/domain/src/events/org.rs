//! Org aggregate events, including org domains and action flows.

use serde::{Deserialize, Serialize};

use idforge_core::{ActionId, DomainName};
use idforge_events::EventType;

use crate::action::{FlowType, TriggerType};

pub const ORG_ADDED: EventType = EventType::from_static("org.added");
pub const ORG_CHANGED: EventType = EventType::from_static("org.changed");
pub const ORG_DEACTIVATED: EventType = EventType::from_static("org.deactivated");
pub const ORG_REACTIVATED: EventType = EventType::from_static("org.reactivated");
pub const ORG_REMOVED: EventType = EventType::from_static("org.removed");
pub const ORG_DOMAIN_ADDED: EventType = EventType::from_static("org.domain.added");
pub const ORG_DOMAIN_VERIFIED: EventType = EventType::from_static("org.domain.verified");
pub const ORG_DOMAIN_PRIMARY_SET: EventType = EventType::from_static("org.domain.primary.set");
pub const ORG_DOMAIN_REMOVED: EventType = EventType::from_static("org.domain.removed");
pub const ORG_FLOW_TRIGGER_ACTIONS_SET: EventType =
    EventType::from_static("org.flow.trigger_actions.set");
pub const ORG_FLOW_TRIGGER_ACTIONS_CASCADE_REMOVED: EventType =
    EventType::from_static("org.flow.trigger_actions.cascade_removed");
pub const ORG_FLOW_CLEARED: EventType = EventType::from_static("org.flow.cleared");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAdded {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgChanged {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRemoved {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainAdded {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainVerified {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainPrimarySet {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainRemoved {
    pub domain: DomainName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActionsSet {
    pub flow_type: FlowType,
    pub trigger_type: TriggerType,
    pub action_ids: Vec<ActionId>,
}

/// Appended when an action is removed: the action disappears from every
/// trigger list that referenced it, in the same push as the removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActionsCascadeRemoved {
    pub flow_type: FlowType,
    pub trigger_type: TriggerType,
    pub action_id: ActionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCleared {
    pub flow_type: FlowType,
}
