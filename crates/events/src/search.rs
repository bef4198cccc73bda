//! Event search filters.

use serde::{Deserialize, Serialize};

use idforge_core::InstanceId;

use crate::aggregate::AggregateType;
use crate::event::{EventType, StoredEvent};

/// Result ordering of a search.
///
/// Single-aggregate loads read in `(aggregate_id, version)` order; anything
/// spanning aggregates reads in global `position` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordering {
    AggregateVersion,
    Position,
}

/// Filter over the event log. All set fields must match (conjunction);
/// list fields match any of their entries (disjunction).
///
/// Commands always scope to an instance; only the projection runtime, which
/// tails the whole log, leaves `instance_id` unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub instance_id: Option<InstanceId>,
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub resource_owner: Option<String>,
    pub event_types: Vec<EventType>,
    /// Exclusive lower bound on global position.
    pub from_position: Option<u64>,
    pub limit: Option<usize>,
    pub ordering: Ordering,
}

impl SearchQuery {
    pub fn instance(instance_id: &InstanceId) -> Self {
        Self {
            instance_id: Some(instance_id.clone()),
            ..Self::all_instances()
        }
    }

    pub fn all_instances() -> Self {
        Self {
            instance_id: None,
            aggregate_types: Vec::new(),
            aggregate_ids: Vec::new(),
            resource_owner: None,
            event_types: Vec::new(),
            from_position: None,
            limit: None,
            ordering: Ordering::Position,
        }
    }

    pub fn aggregate_type(mut self, ty: AggregateType) -> Self {
        self.aggregate_types.push(ty);
        self
    }

    pub fn aggregate_id(mut self, id: impl Into<String>) -> Self {
        self.aggregate_ids.push(id.into());
        self
    }

    pub fn resource_owner(mut self, owner: impl Into<String>) -> Self {
        self.resource_owner = Some(owner.into());
        self
    }

    pub fn event_type(mut self, ty: EventType) -> Self {
        self.event_types.push(ty);
        self
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types.extend(types);
        self
    }

    pub fn from_position(mut self, position: u64) -> Self {
        self.from_position = Some(position);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by_version(mut self) -> Self {
        self.ordering = Ordering::AggregateVersion;
        self
    }

    /// Whether a stored event satisfies this filter. Shared by the in-memory
    /// store and guard evaluation.
    pub fn matches(&self, event: &StoredEvent) -> bool {
        if let Some(instance_id) = &self.instance_id {
            if &event.instance_id != instance_id {
                return false;
            }
        }
        if !self.aggregate_types.is_empty() && !self.aggregate_types.contains(&event.aggregate_type)
        {
            return false;
        }
        if !self.aggregate_ids.is_empty()
            && !self.aggregate_ids.iter().any(|id| id == &event.aggregate_id)
        {
            return false;
        }
        if let Some(owner) = &self.resource_owner {
            if &event.resource_owner != owner {
                return false;
            }
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if let Some(from) = self.from_position {
            if event.position <= from {
                return false;
            }
        }
        true
    }
}
