//! Per-projection cursors: the `current_states` contract.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use idforge_core::{Error, Result};

/// Where a projection stands: the highest global position applied and when
/// it last completed a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub position: u64,
    pub last_successful_run: DateTime<Utc>,
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, projection: &str) -> Result<Option<CursorState>>;
    async fn set(&self, projection: &str, position: u64, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
impl<S> CursorStore for std::sync::Arc<S>
where
    S: CursorStore + ?Sized,
{
    async fn get(&self, projection: &str) -> Result<Option<CursorState>> {
        (**self).get(projection).await
    }

    async fn set(&self, projection: &str, position: u64, at: DateTime<Utc>) -> Result<()> {
        (**self).set(projection, position, at).await
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, CursorState>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn get(&self, projection: &str) -> Result<Option<CursorState>> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| Error::internal("QUERY-cu01", "cursor store lock poisoned"))?;
        Ok(cursors.get(projection).copied())
    }

    async fn set(&self, projection: &str, position: u64, at: DateTime<Utc>) -> Result<()> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| Error::internal("QUERY-cu02", "cursor store lock poisoned"))?;
        cursors.insert(
            projection.to_string(),
            CursorState {
                position,
                last_successful_run: at,
            },
        );
        Ok(())
    }
}

/// Cursor persistence in the `current_states` table.
#[derive(Debug, Clone)]
pub struct PostgresCursorStore {
    pool: PgPool,
}

impl PostgresCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS current_states (
                projection_name     TEXT PRIMARY KEY,
                position            BIGINT NOT NULL,
                last_successful_run TIMESTAMPTZ NOT NULL
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
impl CursorStore for PostgresCursorStore {
    async fn get(&self, projection: &str) -> Result<Option<CursorState>> {
        let row = sqlx::query(
            "SELECT position, last_successful_run FROM current_states WHERE projection_name = $1",
        )
        .bind(projection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", &e))?;
        row.map(|r| {
            let position: i64 = r.try_get("position").map_err(|e| map_sqlx_error("get", &e))?;
            let last_successful_run: DateTime<Utc> = r
                .try_get("last_successful_run")
                .map_err(|e| map_sqlx_error("get", &e))?;
            Ok(CursorState {
                position: position as u64,
                last_successful_run,
            })
        })
        .transpose()
    }

    async fn set(&self, projection: &str, position: u64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO current_states (projection_name, position, last_successful_run)
            VALUES ($1, $2, $3)
            ON CONFLICT (projection_name)
            DO UPDATE SET position = EXCLUDED.position,
                          last_successful_run = EXCLUDED.last_successful_run
            "#,
        )
        .bind(projection)
        .bind(position as i64)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set", &e))?;
        Ok(())
    }
}

fn map_sqlx_error(op: &str, err: &sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::unavailable("QUERY-cu03", format!("{op}: storage unavailable ({err})"))
        }
        _ => Error::internal("QUERY-cu04", format!("{op}: {err}")),
    }
}
