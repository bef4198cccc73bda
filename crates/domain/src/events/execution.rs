//! Execution aggregate events.

use serde::{Deserialize, Serialize};

use idforge_events::EventType;

use crate::execution::{ExecutionCondition, ExecutionTargetRef};

pub const EXECUTION_SET: EventType = EventType::from_static("execution.set");
pub const EXECUTION_REMOVED: EventType = EventType::from_static("execution.removed");

/// Set is an upsert: the aggregate id is derived from the condition, so
/// repeated sets replace the target list in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSet {
    pub condition: ExecutionCondition,
    pub targets: Vec<ExecutionTargetRef>,
}
