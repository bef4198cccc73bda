//! Webhook target aggregate events.

use serde::{Deserialize, Serialize};

use idforge_events::EventType;

use crate::target::TargetType;

pub const TARGET_ADDED: EventType = EventType::from_static("target.added");
pub const TARGET_CHANGED: EventType = EventType::from_static("target.changed");
pub const TARGET_SIGNING_KEY_SET: EventType = EventType::from_static("target.signing_key.set");
pub const TARGET_REMOVED: EventType = EventType::from_static("target.removed");

/// The signing key is persisted as opaque bytes (assumed wrapped by the
/// caller's key layer); the plaintext leaves the engine once, at creation
/// or rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAdded {
    pub name: String,
    pub target_type: TargetType,
    pub endpoint: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub interrupt_on_error: bool,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetChanged {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_type: Option<TargetType>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub interrupt_on_error: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSigningKeySet {
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRemoved {
    pub name: String,
}
