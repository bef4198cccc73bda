//! Postgres-backed event log.
//!
//! Schema contract (see `init`): one `events` table keyed by
//! `(instance_id, aggregate_type, aggregate_id, version)` with a BIGSERIAL
//! `position` and secondary indexes on position and event type. The primary
//! key doubles as the optimistic-concurrency backstop: a concurrent append
//! that slips past the in-transaction version check still dies on the unique
//! violation and is reported as a concurrency conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use idforge_core::{Error, InstanceId, Result};
use idforge_events::{
    AggregateType, EventType, Ordering, PositionGuard, Push, SearchQuery, StoredEvent,
};

use crate::retry;
use crate::store::EventStore;

/// Production event log on Postgres. Cheap to clone; wraps a pool.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the log schema when missing.
    pub async fn init(&self) -> Result<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS events (
                instance_id    TEXT NOT NULL,
                aggregate_type TEXT NOT NULL,
                aggregate_id   TEXT NOT NULL,
                resource_owner TEXT NOT NULL,
                event_type     TEXT NOT NULL,
                creator        TEXT NOT NULL,
                created_at     TIMESTAMPTZ NOT NULL,
                version        BIGINT NOT NULL CHECK (version > 0),
                position       BIGSERIAL,
                payload        JSONB NOT NULL,
                PRIMARY KEY (instance_id, aggregate_type, aggregate_id, version)
            );
            CREATE INDEX IF NOT EXISTS events_position_idx ON events (instance_id, position);
            CREATE INDEX IF NOT EXISTS events_event_type_idx ON events (instance_id, event_type);
        "#;
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("init", &e))?;
        Ok(())
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        instance_id: &InstanceId,
        aggregate_type: &AggregateType,
        aggregate_id: &str,
    ) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(version), 0) AS head
            FROM events
            WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
            "#,
        )
        .bind(instance_id.as_str())
        .bind(aggregate_type.as_str())
        .bind(aggregate_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("current_version", &e))?;
        let head: i64 = row.try_get("head").map_err(|e| map_sqlx_error("current_version", &e))?;
        Ok(head as u64)
    }

    async fn check_guard(
        tx: &mut Transaction<'_, Postgres>,
        guard: &PositionGuard,
    ) -> Result<()> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COALESCE(MAX(position), 0) AS newest FROM events WHERE ",
        );
        push_filter(&mut builder, &guard.filter);
        let row = builder
            .build()
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_guard", &e))?;
        let newest: i64 = row.try_get("newest").map_err(|e| map_sqlx_error("check_guard", &e))?;
        if newest as u64 > guard.observed {
            return Err(Error::concurrency_conflict(
                "EVSTORE-pg01",
                format!("guarded range advanced: observed {}, found {newest}", guard.observed),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, push), fields(batches = push.batches.len(), events = push.event_count()), err)]
    async fn push(&self, push: Push) -> Result<Vec<StoredEvent>> {
        if push.is_empty() {
            return Ok(Vec::new());
        }

        retry::with_backoff(|| {
            let push = push.clone();
            async move {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_sqlx_error("begin", &e))?;

                for guard in &push.guards {
                    Self::check_guard(&mut tx, guard).await?;
                }

                let created_at = Utc::now();
                let mut committed = Vec::with_capacity(push.event_count());
                for batch in &push.batches {
                    let current = Self::current_version(
                        &mut tx,
                        &batch.aggregate.instance_id,
                        &batch.aggregate.ty,
                        &batch.aggregate.id,
                    )
                    .await?;
                    if !batch.expected.matches(current) {
                        return Err(Error::concurrency_conflict(
                            "EVSTORE-pg02",
                            format!(
                                "aggregate {}/{} at version {current}, expected {:?}",
                                batch.aggregate.ty, batch.aggregate.id, batch.expected
                            ),
                        ));
                    }

                    let mut version = current;
                    for pending in &batch.events {
                        version += 1;
                        let row = sqlx::query(
                            r#"
                            INSERT INTO events (
                                instance_id, aggregate_type, aggregate_id, resource_owner,
                                event_type, creator, created_at, version, payload
                            )
                            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                            RETURNING position
                            "#,
                        )
                        .bind(batch.aggregate.instance_id.as_str())
                        .bind(batch.aggregate.ty.as_str())
                        .bind(batch.aggregate.id.as_str())
                        .bind(batch.aggregate.resource_owner.as_str())
                        .bind(pending.event_type.as_str())
                        .bind(pending.creator.as_str())
                        .bind(created_at)
                        .bind(version as i64)
                        .bind(&pending.payload)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("insert", &e))?;

                        let position: i64 =
                            row.try_get("position").map_err(|e| map_sqlx_error("insert", &e))?;
                        committed.push(StoredEvent {
                            instance_id: batch.aggregate.instance_id.clone(),
                            aggregate_type: batch.aggregate.ty.clone(),
                            aggregate_id: batch.aggregate.id.clone(),
                            resource_owner: batch.aggregate.resource_owner.clone(),
                            event_type: pending.event_type.clone(),
                            creator: pending.creator.clone(),
                            created_at,
                            version,
                            position: position as u64,
                            payload: pending.payload.clone(),
                        });
                    }
                }

                // Commit failures are deliberately not classed retryable: the
                // transaction outcome is unknown and a blind retry could
                // duplicate the append.
                tx.commit().await.map_err(|e| {
                    Error::internal("EVSTORE-pg03", format!("commit failed: {e}"))
                })?;
                Ok(committed)
            }
        })
        .await
    }

    #[instrument(skip(self, query), err)]
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>> {
        retry::with_backoff(|| async move {
            let mut builder = QueryBuilder::<Postgres>::new(
                "SELECT instance_id, aggregate_type, aggregate_id, resource_owner, \
                 event_type, creator, created_at, version, position, payload \
                 FROM events WHERE ",
            );
            push_filter(&mut builder, query);
            match query.ordering {
                Ordering::Position => builder.push(" ORDER BY position ASC"),
                Ordering::AggregateVersion => builder.push(" ORDER BY aggregate_id ASC, version ASC"),
            };
            if let Some(limit) = query.limit {
                builder.push(" LIMIT ");
                builder.push_bind(limit as i64);
            }

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("filter", &e))?;
            rows.iter().map(decode_event).collect()
        })
        .await
    }

    async fn latest_position(&self, instance_id: &InstanceId) -> Result<u64> {
        retry::with_backoff(|| async move {
            let row = sqlx::query(
                "SELECT COALESCE(MAX(position), 0) AS newest FROM events WHERE instance_id = $1",
            )
            .bind(instance_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_position", &e))?;
            let newest: i64 =
                row.try_get("newest").map_err(|e| map_sqlx_error("latest_position", &e))?;
            Ok(newest as u64)
        })
        .await
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &SearchQuery) {
    builder.push("TRUE");
    if let Some(instance_id) = &query.instance_id {
        builder.push(" AND instance_id = ");
        builder.push_bind(instance_id.as_str().to_string());
    }
    if !query.aggregate_types.is_empty() {
        let types: Vec<String> = query
            .aggregate_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        builder.push(" AND aggregate_type = ANY(");
        builder.push_bind(types);
        builder.push(")");
    }
    if !query.aggregate_ids.is_empty() {
        builder.push(" AND aggregate_id = ANY(");
        builder.push_bind(query.aggregate_ids.clone());
        builder.push(")");
    }
    if let Some(owner) = &query.resource_owner {
        builder.push(" AND resource_owner = ");
        builder.push_bind(owner.clone());
    }
    if !query.event_types.is_empty() {
        let types: Vec<String> = query.event_types.iter().map(|t| t.as_str().to_string()).collect();
        builder.push(" AND event_type = ANY(");
        builder.push_bind(types);
        builder.push(")");
    }
    if let Some(from) = query.from_position {
        builder.push(" AND position > ");
        builder.push_bind(from as i64);
    }
}

fn decode_event(row: &PgRow) -> Result<StoredEvent> {
    let version: i64 = row.try_get("version").map_err(|e| map_sqlx_error("decode", &e))?;
    let position: i64 = row.try_get("position").map_err(|e| map_sqlx_error("decode", &e))?;
    let created_at: DateTime<Utc> =
        row.try_get("created_at").map_err(|e| map_sqlx_error("decode", &e))?;
    Ok(StoredEvent {
        instance_id: InstanceId::new(
            row.try_get::<String, _>("instance_id")
                .map_err(|e| map_sqlx_error("decode", &e))?,
        ),
        aggregate_type: AggregateType::new(
            row.try_get::<String, _>("aggregate_type")
                .map_err(|e| map_sqlx_error("decode", &e))?,
        ),
        aggregate_id: row
            .try_get("aggregate_id")
            .map_err(|e| map_sqlx_error("decode", &e))?,
        resource_owner: row
            .try_get("resource_owner")
            .map_err(|e| map_sqlx_error("decode", &e))?,
        event_type: EventType::new(
            row.try_get::<String, _>("event_type")
                .map_err(|e| map_sqlx_error("decode", &e))?,
        ),
        creator: row.try_get("creator").map_err(|e| map_sqlx_error("decode", &e))?,
        created_at,
        version: version as u64,
        position: position as u64,
        payload: row.try_get("payload").map_err(|e| map_sqlx_error("decode", &e))?,
    })
}

/// Classify sqlx failures into the closed taxonomy.
///
/// Unique violations on the events primary key mean another writer advanced
/// the aggregate between our version check and insert.
fn map_sqlx_error(op: &str, err: &sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => Error::concurrency_conflict(
                "EVSTORE-pg04",
                format!("{op}: concurrent append detected"),
            ),
            _ => Error::internal("EVSTORE-pg05", format!("{op}: {db}")),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::unavailable("EVSTORE-pg06", format!("{op}: storage unavailable ({err})"))
        }
        _ => Error::internal("EVSTORE-pg07", format!("{op}: {err}")),
    }
}
