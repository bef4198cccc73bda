//! Action aggregate events.

use serde::{Deserialize, Serialize};

use idforge_events::EventType;

pub const ACTION_ADDED: EventType = EventType::from_static("action.added");
pub const ACTION_CHANGED: EventType = EventType::from_static("action.changed");
pub const ACTION_DEACTIVATED: EventType = EventType::from_static("action.deactivated");
pub const ACTION_REACTIVATED: EventType = EventType::from_static("action.reactivated");
pub const ACTION_REMOVED: EventType = EventType::from_static("action.removed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAdded {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub allowed_to_fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChanged {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub allowed_to_fail: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRemoved {
    pub name: String,
}
