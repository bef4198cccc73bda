//! Command return value: where the aggregate ended up after the push.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Details returned by every mutating command.
///
/// Mirrors the last pushed event: `sequence` is its aggregate version,
/// `event_date` its creation time, `resource_owner` the owning org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub sequence: u64,
    pub event_date: DateTime<Utc>,
    pub resource_owner: String,
}

impl ObjectDetails {
    pub fn new(sequence: u64, event_date: DateTime<Utc>, resource_owner: impl Into<String>) -> Self {
        Self {
            sequence,
            event_date,
            resource_owner: resource_owner.into(),
        }
    }
}
