//! Push units: what a command hands to the event log.

use serde::Serialize;
use serde_json::Value as JsonValue;

use idforge_core::{Error, Result};

use crate::aggregate::Aggregate;
use crate::event::EventType;
use crate::search::SearchQuery;

/// Optimistic-concurrency expectation for one aggregate within a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check; append after whatever the current head is.
    Any,
    /// The aggregate must not exist yet (no events).
    NoStream,
    /// The head must be exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, current: u64) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => current == 0,
            Self::Exact(v) => current == v,
        }
    }
}

/// A not-yet-persisted event within an [`AggregateBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub event_type: EventType,
    pub creator: String,
    pub payload: JsonValue,
}

/// All events a push appends to a single aggregate, with the concurrency
/// expectation observed when the write model was loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBatch {
    pub aggregate: Aggregate,
    pub expected: ExpectedVersion,
    pub events: Vec<PendingEvent>,
}

impl AggregateBatch {
    pub fn new(aggregate: Aggregate, expected: ExpectedVersion) -> Self {
        Self {
            aggregate,
            expected,
            events: Vec::new(),
        }
    }

    /// Append a typed payload; serialization failures are internal errors.
    pub fn event<E: Serialize>(
        mut self,
        event_type: EventType,
        creator: impl Into<String>,
        payload: &E,
    ) -> Result<Self> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            Error::internal("EVENT-sr01", format!("payload serialization failed: {e}"))
                .with_detail("event_type", event_type.as_str())
        })?;
        self.events.push(PendingEvent {
            event_type,
            creator: creator.into(),
            payload,
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Serialisation guard over a slice of the log.
///
/// A push carrying a guard fails with a concurrency conflict when any event
/// matching `filter` has landed with a position greater than `observed`.
/// This is how a cross-aggregate fold (the org-wide username map, for
/// instance) is made serialisable with the append it protects: the command
/// records the position up to which it folded, and the store refuses the
/// push if the fold went stale.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionGuard {
    pub filter: SearchQuery,
    /// Highest position the caller has folded.
    pub observed: u64,
}

impl PositionGuard {
    pub fn new(filter: SearchQuery, observed: u64) -> Self {
        Self { filter, observed }
    }
}

/// An atomic multi-aggregate append: either every batch lands or none does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Push {
    pub batches: Vec<AggregateBatch>,
    pub guards: Vec<PositionGuard>,
}

impl Push {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(batch: AggregateBatch) -> Self {
        Self {
            batches: vec![batch],
            guards: Vec::new(),
        }
    }

    pub fn with_batch(mut self, batch: AggregateBatch) -> Self {
        self.batches.push(batch);
        self
    }

    pub fn with_guard(mut self, guard: PositionGuard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(AggregateBatch::is_empty)
    }

    pub fn event_count(&self) -> usize {
        self.batches.iter().map(|b| b.events.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_version_matching() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(7));
        assert!(ExpectedVersion::NoStream.matches(0));
        assert!(!ExpectedVersion::NoStream.matches(1));
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
