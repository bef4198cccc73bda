//! Projection runtime: one background task per projection tailing the log.
//!
//! Each tick reads up to `batch_size` events past the cursor (global order),
//! applies them through `reduce`, and advances the cursor only when the
//! whole batch applied. A failing reduce leaves the cursor in place; the
//! task backs off and retries the same batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use idforge_core::{Error, Result};
use idforge_events::{EventType, SearchQuery, StoredEvent};
use idforge_eventstore::EventStore;

use crate::cursor::CursorStore;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A materialized view fed from the log.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Event types this projection subscribes to.
    fn event_types(&self) -> Vec<EventType>;

    fn batch_size(&self) -> usize {
        200
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// One-time setup (DDL). A projection whose init fails must not start.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Apply one event. Must be idempotent under replay.
    async fn reduce(&self, event: &StoredEvent) -> Result<()>;
}

/// Handle over the spawned projection tasks.
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Request shutdown and wait for every task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Drives a set of projections against an event store.
pub struct ProjectionRunner<S> {
    store: S,
    cursors: Arc<dyn CursorStore>,
}

impl<S> ProjectionRunner<S>
where
    S: EventStore + Clone + Send + Sync + 'static,
{
    pub fn new(store: S, cursors: Arc<dyn CursorStore>) -> Self {
        Self { store, cursors }
    }

    /// Run one tick for a projection: read, apply, advance. Returns the
    /// number of events applied. Exposed so tests can drive projections
    /// deterministically.
    pub async fn tick(&self, projection: &dyn Projection) -> Result<usize> {
        tick(&self.store, self.cursors.as_ref(), projection).await
    }

    /// Tick every projection until the whole set reports no new events.
    pub async fn run_to_latest(&self, projections: &[Arc<dyn Projection>]) -> Result<()> {
        loop {
            let mut applied = 0;
            for projection in projections {
                applied += self.tick(projection.as_ref()).await?;
            }
            if applied == 0 {
                return Ok(());
            }
        }
    }

    /// Initialize and spawn all projections. Fails (starting nothing) when
    /// any `init` fails.
    pub async fn start(&self, projections: Vec<Arc<dyn Projection>>) -> Result<RunnerHandle> {
        for projection in &projections {
            projection.init().await.map_err(|e| {
                error!(projection = projection.name(), error = %e, "projection init failed");
                e
            })?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(projections.len());
        for projection in projections {
            let store = self.store.clone();
            let cursors = Arc::clone(&self.cursors);
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                info!(projection = projection.name(), "projection started");
                let mut backoff = projection.interval();
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    match tick(&store, cursors.as_ref(), projection.as_ref()).await {
                        Ok(applied) => {
                            backoff = if applied > 0 {
                                // Drain quickly while there is a backlog.
                                Duration::ZERO
                            } else {
                                projection.interval()
                            };
                        }
                        Err(err) => {
                            warn!(
                                projection = projection.name(),
                                error = %err,
                                "projection reduce failed, backing off"
                            );
                            backoff = (backoff.max(projection.interval()) * 2).min(MAX_BACKOFF);
                        }
                    }
                }
                info!(projection = projection.name(), "projection stopped");
            }));
        }

        Ok(RunnerHandle {
            shutdown: shutdown_tx,
            tasks,
        })
    }

    /// Wait until a projection's cursor has passed `position`.
    ///
    /// This is the read-your-write primitive: a caller holding the details
    /// of a push waits for the relevant projection before reading.
    pub async fn await_position(
        &self,
        projection_name: &str,
        position: u64,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = self
                .cursors
                .get(projection_name)
                .await?
                .map(|c| c.position)
                .unwrap_or(0);
            if current >= position {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::deadline_exceeded(
                    "QUERY-rt01",
                    format!("projection '{projection_name}' did not reach position {position}"),
                ));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

async fn tick(
    store: &dyn EventStore,
    cursors: &dyn CursorStore,
    projection: &dyn Projection,
) -> Result<usize> {
    let cursor = cursors
        .get(projection.name())
        .await?
        .map(|c| c.position)
        .unwrap_or(0);

    let query = SearchQuery::all_instances()
        .event_types(projection.event_types())
        .from_position(cursor)
        .limit(projection.batch_size());
    let events = store.filter(&query).await?;

    for event in &events {
        // Cursor stays put on failure so the batch replays; reduce is
        // idempotent, so the retry converges.
        projection.reduce(event).await?;
    }

    let position = events.last().map(|e| e.position).unwrap_or(cursor);
    cursors.set(projection.name(), position, Utc::now()).await?;
    Ok(events.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

    use idforge_core::{InstanceId, OrgId};
    use idforge_events::{Aggregate, AggregateBatch, AggregateType, ExpectedVersion, Push};
    use idforge_eventstore::InMemoryEventStore;

    use crate::cursor::InMemoryCursorStore;

    const TEST_EVENT: EventType = EventType::from_static("org.added");

    struct CountingProjection {
        applied: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn event_types(&self) -> Vec<EventType> {
            vec![TEST_EVENT]
        }

        async fn reduce(&self, _event: &StoredEvent) -> Result<()> {
            if self.fail.load(AtomicOrdering::SeqCst) {
                return Err(Error::unavailable("QUERY-tst1", "simulated failure"));
            }
            self.applied.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    async fn seed(store: &InMemoryEventStore, org: &str) -> u64 {
        let aggregate = Aggregate::new(
            AggregateType::from_static("org"),
            org,
            &OrgId::new(org),
            &InstanceId::new("i1"),
        );
        let batch = AggregateBatch::new(aggregate, ExpectedVersion::Any)
            .event(TEST_EVENT, "system", &serde_json::json!({"name": org}))
            .unwrap();
        store.push(Push::single(batch)).await.unwrap().last().unwrap().position
    }

    #[tokio::test]
    async fn tick_applies_in_order_and_advances_cursor() {
        let store = Arc::new(InMemoryEventStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        let runner = ProjectionRunner::new(store.clone(), cursors.clone());
        let projection = CountingProjection {
            applied: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        };

        seed(&store, "o1").await;
        let last = seed(&store, "o2").await;

        let applied = runner.tick(&projection).await.unwrap();
        assert_eq!(applied, 2);
        assert_eq!(cursors.get("counting").await.unwrap().unwrap().position, last);

        // Nothing new: the cursor keeps the runtime idle.
        assert_eq!(runner.tick(&projection).await.unwrap(), 0);
        assert_eq!(projection.applied.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_reduce_leaves_the_cursor_in_place() {
        let store = Arc::new(InMemoryEventStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        let runner = ProjectionRunner::new(store.clone(), cursors.clone());
        let projection = CountingProjection {
            applied: AtomicUsize::new(0),
            fail: AtomicBool::new(true),
        };

        seed(&store, "o1").await;
        assert!(runner.tick(&projection).await.is_err());
        assert!(cursors.get("counting").await.unwrap().is_none());

        // The same batch replays after recovery.
        projection.fail.store(false, AtomicOrdering::SeqCst);
        assert_eq!(runner.tick(&projection).await.unwrap(), 1);
        assert_eq!(projection.applied.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn await_position_times_out_without_progress() {
        let store = Arc::new(InMemoryEventStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());
        let runner = ProjectionRunner::new(store, cursors);
        let err = runner
            .await_position("counting", 5, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, idforge_core::ErrorKind::DeadlineExceeded);
    }
}
