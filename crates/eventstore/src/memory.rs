//! In-memory event log for tests and development.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use idforge_core::{Error, InstanceId, Result};
use idforge_events::{Ordering, Push, SearchQuery, StoredEvent};

use crate::store::EventStore;

#[derive(Debug, Default)]
struct Log {
    events: Vec<StoredEvent>,
    next_position: u64,
}

impl Log {
    fn current_version(&self, instance_id: &InstanceId, ty: &str, id: &str) -> u64 {
        self.events
            .iter()
            .filter(|e| {
                &e.instance_id == instance_id
                    && e.aggregate_type.as_str() == ty
                    && e.aggregate_id == id
            })
            .map(|e| e.version)
            .max()
            .unwrap_or(0)
    }
}

/// In-memory append-only event log. Single mutex; not meant for load.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: Mutex<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| Error::internal("EVSTORE-mm01", "event log lock poisoned"))?;

        // Guards first: the push is refused when any matching event landed
        // past the observed position.
        for guard in &push.guards {
            let newest = log
                .events
                .iter()
                .filter(|e| guard.filter.matches(e))
                .map(|e| e.position)
                .max()
                .unwrap_or(0);
            if newest > guard.observed {
                return Err(Error::concurrency_conflict(
                    "EVSTORE-mm02",
                    format!(
                        "guarded range advanced: observed {}, found {}",
                        guard.observed, newest
                    ),
                ));
            }
        }

        // Validate every batch before mutating anything so the push stays
        // all-or-nothing.
        for batch in &push.batches {
            let current = log.current_version(
                &batch.aggregate.instance_id,
                batch.aggregate.ty.as_str(),
                &batch.aggregate.id,
            );
            if !batch.expected.matches(current) {
                return Err(Error::concurrency_conflict(
                    "EVSTORE-mm03",
                    format!(
                        "aggregate {}/{} at version {current}, expected {:?}",
                        batch.aggregate.ty, batch.aggregate.id, batch.expected
                    ),
                ));
            }
        }

        let created_at = Utc::now();
        let mut committed = Vec::with_capacity(push.event_count());
        for batch in push.batches {
            let mut version = log.current_version(
                &batch.aggregate.instance_id,
                batch.aggregate.ty.as_str(),
                &batch.aggregate.id,
            );
            for pending in batch.events {
                version += 1;
                log.next_position += 1;
                let stored = StoredEvent {
                    instance_id: batch.aggregate.instance_id.clone(),
                    aggregate_type: batch.aggregate.ty.clone(),
                    aggregate_id: batch.aggregate.id.clone(),
                    resource_owner: batch.aggregate.resource_owner.clone(),
                    event_type: pending.event_type,
                    creator: pending.creator,
                    created_at,
                    version,
                    position: log.next_position,
                    payload: pending.payload,
                };
                log.events.push(stored.clone());
                committed.push(stored);
            }
        }
        Ok(committed)
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>> {
        let log = self
            .log
            .lock()
            .map_err(|_| Error::internal("EVSTORE-mm04", "event log lock poisoned"))?;

        let mut events: Vec<StoredEvent> = log
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        match query.ordering {
            Ordering::Position => events.sort_by_key(|e| e.position),
            Ordering::AggregateVersion => events.sort_by(|a, b| {
                a.aggregate_id
                    .cmp(&b.aggregate_id)
                    .then(a.version.cmp(&b.version))
            }),
        }
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn latest_position(&self, instance_id: &InstanceId) -> Result<u64> {
        let log = self
            .log
            .lock()
            .map_err(|_| Error::internal("EVSTORE-mm05", "event log lock poisoned"))?;
        Ok(log
            .events
            .iter()
            .filter(|e| &e.instance_id == instance_id)
            .map(|e| e.position)
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idforge_core::{ErrorKind, OrgId};
    use idforge_events::{Aggregate, AggregateBatch, AggregateType, EventType, ExpectedVersion, PositionGuard};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Payload {
        name: String,
    }

    fn aggregate(id: &str) -> Aggregate {
        Aggregate::new(
            AggregateType::from_static("org"),
            id,
            &OrgId::new(id),
            &InstanceId::new("i1"),
        )
    }

    fn batch(id: &str, expected: ExpectedVersion, n: usize) -> AggregateBatch {
        let mut b = AggregateBatch::new(aggregate(id), expected);
        for i in 0..n {
            b = b
                .event(
                    EventType::from_static("org.changed"),
                    "system",
                    &Payload { name: format!("n{i}") },
                )
                .unwrap();
        }
        b
    }

    #[tokio::test]
    async fn versions_are_contiguous_and_positions_global() {
        let store = InMemoryEventStore::new();
        store
            .push(Push::single(batch("o1", ExpectedVersion::NoStream, 2)))
            .await
            .unwrap();
        store
            .push(Push::single(batch("o2", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap();
        let more = store
            .push(Push::single(batch("o1", ExpectedVersion::Exact(2), 1)))
            .await
            .unwrap();

        assert_eq!(more[0].version, 3);
        assert_eq!(more[0].position, 4);

        let o1 = store
            .filter(
                &SearchQuery::instance(&InstanceId::new("i1"))
                    .aggregate_type(AggregateType::from_static("org"))
                    .aggregate_id("o1")
                    .order_by_version(),
            )
            .await
            .unwrap();
        let versions: Vec<u64> = o1.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stale_expectation_conflicts() {
        let store = InMemoryEventStore::new();
        store
            .push(Push::single(batch("o1", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap();
        let err = store
            .push(Push::single(batch("o1", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn guard_detects_stale_fold() {
        let store = InMemoryEventStore::new();
        store
            .push(Push::single(batch("o1", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap();

        let filter = SearchQuery::instance(&InstanceId::new("i1"))
            .aggregate_type(AggregateType::from_static("org"));
        let observed = store.latest_position(&InstanceId::new("i1")).await.unwrap();

        // Another writer advances the guarded range.
        store
            .push(Push::single(batch("o2", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap();

        let err = store
            .push(
                Push::single(batch("o3", ExpectedVersion::NoStream, 1))
                    .with_guard(PositionGuard::new(filter, observed)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn multi_aggregate_push_is_atomic() {
        let store = InMemoryEventStore::new();
        store
            .push(Push::single(batch("o1", ExpectedVersion::NoStream, 1)))
            .await
            .unwrap();

        // Second batch fails its expectation, so the first must not land.
        let err = store
            .push(
                Push::new()
                    .with_batch(batch("o2", ExpectedVersion::NoStream, 1))
                    .with_batch(batch("o1", ExpectedVersion::NoStream, 1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyConflict);

        let o2 = store
            .filter(&SearchQuery::instance(&InstanceId::new("i1")).aggregate_id("o2"))
            .await
            .unwrap();
        assert!(o2.is_empty());
    }
}
