//! Write models: in-memory reducers used to validate and then incrementally
//! update aggregate state during a command.
//!
//! A write model is a pure fold `(state, event) -> state`. Loading queries
//! the events the model declares, sorts them by aggregate version, and folds;
//! after a successful push the same fold advances the model past the new
//! events so the returned details reflect the new sequence without a reload.
//!
//! Models that track one sub-entity of a shared aggregate (an application on
//! a project, a factor on a login policy) must filter payloads by the
//! sub-entity id inside `reduce`.

use chrono::{DateTime, Utc};

use idforge_core::{InstanceId, ObjectDetails, Result};

use crate::event::StoredEvent;
use crate::push::ExpectedVersion;
use crate::search::SearchQuery;

/// Bookkeeping shared by every write model.
#[derive(Debug, Clone, Default)]
pub struct WriteModelBase {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: InstanceId,
    /// Version of the last event folded in.
    pub processed_sequence: u64,
    /// Global position of the last event folded in. Cross-aggregate folds
    /// use this as the observed position for push guards.
    pub processed_position: u64,
    pub change_date: Option<DateTime<Utc>>,
}

impl WriteModelBase {
    pub fn new(aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            ..Default::default()
        }
    }

    /// Record an event's metadata. Call once per folded event.
    pub fn note(&mut self, event: &StoredEvent) {
        self.processed_sequence = event.version;
        self.processed_position = self.processed_position.max(event.position);
        self.change_date = Some(event.created_at);
        if self.resource_owner.is_empty() {
            self.resource_owner = event.resource_owner.clone();
        }
        if self.instance_id.is_empty() {
            self.instance_id = event.instance_id.clone();
        }
    }

    /// The concurrency expectation a push derived from this model must carry.
    pub fn expected_version(&self) -> ExpectedVersion {
        if self.processed_sequence == 0 {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(self.processed_sequence)
        }
    }

    pub fn details(&self) -> ObjectDetails {
        ObjectDetails::new(
            self.processed_sequence,
            self.change_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            self.resource_owner.clone(),
        )
    }
}

/// The fold contract.
pub trait WriteModel {
    fn base(&self) -> &WriteModelBase;

    fn base_mut(&mut self) -> &mut WriteModelBase;

    /// The events this model folds, ordered by aggregate version.
    fn query(&self) -> SearchQuery;

    /// Fold one event into the state. Must be deterministic and must ignore
    /// events not addressed to the tracked (sub-)entity. Callers record the
    /// event on the base via [`WriteModelBase::note`]; implementations only
    /// update their own fields.
    fn reduce(&mut self, event: &StoredEvent) -> Result<()>;

    /// Fold a sorted batch (used by the loader and after pushes).
    fn reduce_all(&mut self, events: &[StoredEvent]) -> Result<()>
    where
        Self: Sized,
    {
        for event in events {
            self.base_mut().note(event);
            self.reduce(event)?;
        }
        Ok(())
    }

    fn details(&self) -> ObjectDetails {
        self.base().details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateType;
    use crate::event::EventType;
    use chrono::TimeZone;

    fn event(version: u64) -> StoredEvent {
        StoredEvent {
            instance_id: InstanceId::new("i1"),
            aggregate_type: AggregateType::from_static("org"),
            aggregate_id: "o1".to_string(),
            resource_owner: "o1".to_string(),
            event_type: EventType::from_static("org.added"),
            creator: "system".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            version,
            position: version,
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn base_tracks_sequence_owner_and_expectation() {
        let mut base = WriteModelBase::new("o1");
        assert_eq!(base.expected_version(), ExpectedVersion::NoStream);

        base.note(&event(1));
        base.note(&event(2));
        assert_eq!(base.processed_sequence, 2);
        assert_eq!(base.resource_owner, "o1");
        assert_eq!(base.expected_version(), ExpectedVersion::Exact(2));

        let details = base.details();
        assert_eq!(details.sequence, 2);
        assert_eq!(details.resource_owner, "o1");
    }
}
