//! The event-log contract and write-model load helpers.

use async_trait::async_trait;

use idforge_core::{InstanceId, Result};
use idforge_events::{Ordering, Push, SearchQuery, StoredEvent, WriteModel};

/// Append-only, instance-scoped event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a push atomically.
    ///
    /// Implementations must:
    /// - assign contiguous `version`s per aggregate, starting at 1
    /// - assign strictly increasing global `position`s
    /// - reject the whole push with a concurrency conflict when any batch's
    ///   expectation fails or any guard observes newer matching events
    /// - stamp `created_at` with server time
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>>;

    /// Read events matching the filter, in the filter's ordering.
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>>;

    /// Highest global position assigned for an instance (0 when empty).
    async fn latest_position(&self, instance_id: &InstanceId) -> Result<u64>;
}

#[async_trait]
impl<S> EventStore for std::sync::Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>> {
        (**self).push(push).await
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>> {
        (**self).filter(query).await
    }

    async fn latest_position(&self, instance_id: &InstanceId) -> Result<u64> {
        (**self).latest_position(instance_id).await
    }
}

/// Load a write model: query its events, sort by aggregate version, fold.
pub async fn load_write_model<W: WriteModel + Send>(
    store: &(dyn EventStore),
    model: &mut W,
) -> Result<()> {
    let mut query = model.query();
    query.ordering = Ordering::AggregateVersion;
    let mut events = store.filter(&query).await?;
    events.sort_by(|a, b| {
        a.aggregate_id
            .cmp(&b.aggregate_id)
            .then(a.version.cmp(&b.version))
    });
    for event in &events {
        model.base_mut().note(event);
        model.reduce(event)?;
    }
    Ok(())
}

/// Advance a write model past freshly pushed events so the returned details
/// reflect the new sequence without a reload. Events not matching the
/// model's filter are skipped.
pub fn append_and_reduce<W: WriteModel>(model: &mut W, pushed: &[StoredEvent]) -> Result<()> {
    let query = model.query();
    for event in pushed {
        if query.matches(event) {
            model.base_mut().note(event);
            model.reduce(event)?;
        }
    }
    Ok(())
}
