//! Stored events: immutable facts with per-aggregate and global ordering.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use idforge_core::{Error, InstanceId, Result};

use crate::aggregate::AggregateType;

/// Stable event name (e.g. `user.human.added`).
///
/// Convention: `{aggregate}.{entity}.{action}`. The identifier is persisted
/// with the event and must never change; reducers and projections match on
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event as read back from the log.
///
/// Two orderings are assigned at push time and never change afterwards:
///
/// - `version`: contiguous, strictly increasing per
///   `(instance_id, aggregate_type, aggregate_id)`, starting at 1
/// - `position`: strictly increasing over the whole log
///
/// Payloads are event-type-scoped JSON maps. Adding fields to a payload is
/// backward compatible: reducers deserialize with defaults and ignore
/// unknown fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub instance_id: InstanceId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub resource_owner: String,
    pub event_type: EventType,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    /// Monotone per-aggregate version, starts at 1.
    pub version: u64,
    /// Monotone position over the whole log.
    pub position: u64,
    pub payload: JsonValue,
}

impl StoredEvent {
    /// Deserialize the payload into an event-type-scoped struct.
    pub fn payload_as<E: DeserializeOwned>(&self) -> Result<E> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            Error::internal("EVENT-pl01", format!("payload deserialization failed: {e}"))
                .with_detail("event_type", self.event_type.as_str())
        })
    }

    pub fn is(&self, event_type: &EventType) -> bool {
        &self.event_type == event_type
    }
}
