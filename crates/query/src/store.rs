//! Instance-scoped key/value stores for materialized views.
//!
//! Projections write views through this abstraction; the concrete SQL shape
//! is not part of the query contract, so the Postgres store keeps one JSONB
//! table per process with the projection name as part of the key.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Row};

use idforge_core::{Error, InstanceId, Result};

/// Instance-isolated view store. Upserts are keyed by natural identity,
/// which is what makes projection replay idempotent.
#[async_trait]
pub trait ReadStore<V>: Send + Sync {
    async fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<V>>;
    async fn upsert(&self, instance_id: &InstanceId, key: &str, value: V) -> Result<()>;
    async fn remove(&self, instance_id: &InstanceId, key: &str) -> Result<()>;
    async fn list(&self, instance_id: &InstanceId) -> Result<Vec<V>>;
}

#[async_trait]
impl<V, S> ReadStore<V> for std::sync::Arc<S>
where
    S: ReadStore<V> + ?Sized,
    V: Send + 'static,
{
    async fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<V>> {
        (**self).get(instance_id, key).await
    }

    async fn upsert(&self, instance_id: &InstanceId, key: &str, value: V) -> Result<()> {
        (**self).upsert(instance_id, key, value).await
    }

    async fn remove(&self, instance_id: &InstanceId, key: &str) -> Result<()> {
        (**self).remove(instance_id, key).await
    }

    async fn list(&self, instance_id: &InstanceId) -> Result<Vec<V>> {
        (**self).list(instance_id).await
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadStore<V> {
    inner: RwLock<HashMap<(InstanceId, String), V>>,
}

impl<V> InMemoryReadStore<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for InMemoryReadStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> ReadStore<V> for InMemoryReadStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<V>> {
        let map = self
            .inner
            .read()
            .map_err(|_| Error::internal("QUERY-st01", "read store lock poisoned"))?;
        Ok(map.get(&(instance_id.clone(), key.to_string())).cloned())
    }

    async fn upsert(&self, instance_id: &InstanceId, key: &str, value: V) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| Error::internal("QUERY-st02", "read store lock poisoned"))?;
        map.insert((instance_id.clone(), key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, instance_id: &InstanceId, key: &str) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| Error::internal("QUERY-st03", "read store lock poisoned"))?;
        map.remove(&(instance_id.clone(), key.to_string()));
        Ok(())
    }

    async fn list(&self, instance_id: &InstanceId) -> Result<Vec<V>> {
        let map = self
            .inner
            .read()
            .map_err(|_| Error::internal("QUERY-st04", "read store lock poisoned"))?;
        Ok(map
            .iter()
            .filter(|((i, _), _)| i == instance_id)
            .map(|(_, v)| v.clone())
            .collect())
    }
}

/// Postgres-backed view store: one JSONB row per view entity.
#[derive(Debug, Clone)]
pub struct PostgresReadStore<V> {
    pool: PgPool,
    projection: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> PostgresReadStore<V> {
    pub fn new(pool: PgPool, projection: &'static str) -> Self {
        Self {
            pool,
            projection,
            _marker: PhantomData,
        }
    }

    /// Create the shared view table when missing. Safe to call from every
    /// projection's `init`.
    pub async fn init(&self) -> Result<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS projections (
                projection  TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                key         TEXT NOT NULL,
                value       JSONB NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (projection, instance_id, key)
            );
        "#;
        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("init", &e))?;
        Ok(())
    }
}

#[async_trait]
impl<V> ReadStore<V> for PostgresReadStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, instance_id: &InstanceId, key: &str) -> Result<Option<V>> {
        let row = sqlx::query(
            "SELECT value FROM projections WHERE projection = $1 AND instance_id = $2 AND key = $3",
        )
        .bind(self.projection)
        .bind(instance_id.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", &e))?;
        row.map(|r| decode_value(&r)).transpose()
    }

    async fn upsert(&self, instance_id: &InstanceId, key: &str, value: V) -> Result<()> {
        let value = serde_json::to_value(&value)
            .map_err(|e| Error::internal("QUERY-st05", format!("view serialization failed: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO projections (projection, instance_id, key, value, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (projection, instance_id, key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(self.projection)
        .bind(instance_id.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", &e))?;
        Ok(())
    }

    async fn remove(&self, instance_id: &InstanceId, key: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM projections WHERE projection = $1 AND instance_id = $2 AND key = $3",
        )
        .bind(self.projection)
        .bind(instance_id.as_str())
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove", &e))?;
        Ok(())
    }

    async fn list(&self, instance_id: &InstanceId) -> Result<Vec<V>> {
        let rows = sqlx::query(
            "SELECT value FROM projections WHERE projection = $1 AND instance_id = $2",
        )
        .bind(self.projection)
        .bind(instance_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", &e))?;
        rows.iter().map(decode_value).collect()
    }
}

fn decode_value<V: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<V> {
    let value: serde_json::Value =
        row.try_get("value").map_err(|e| map_sqlx_error("decode", &e))?;
    serde_json::from_value(value)
        .map_err(|e| Error::internal("QUERY-st06", format!("view deserialization failed: {e}")))
}

fn map_sqlx_error(op: &str, err: &sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::unavailable("QUERY-st07", format!("{op}: storage unavailable ({err})"))
        }
        _ => Error::internal("QUERY-st08", format!("{op}: {err}")),
    }
}
