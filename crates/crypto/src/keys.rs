//! Encryption-key storage.
//!
//! Keys are stored in a dedicated table, deliberately outside the event log:
//! key material must be removable without leaving a trace in an immutable
//! history. Material is opaque bytes, assumed already wrapped by the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use idforge_core::{Error, InstanceId, Result};

/// A stored encryption key. `identifier` is unique per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub instance_id: InstanceId,
    pub key_id: String,
    pub identifier: String,
    pub algorithm: String,
    pub key_material: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait EncryptionKeyStore: Send + Sync {
    /// Store a key; fails with `AlreadyExists` when the identifier is taken.
    async fn add(&self, key: EncryptionKey) -> Result<()>;

    /// Look up by key id or identifier.
    async fn get(&self, instance_id: &InstanceId, id_or_identifier: &str)
        -> Result<Option<EncryptionKey>>;

    /// List keys, optionally filtered by algorithm.
    async fn list(
        &self,
        instance_id: &InstanceId,
        algorithm: Option<&str>,
    ) -> Result<Vec<EncryptionKey>>;

    /// Remove a key; removing an absent key is a no-op.
    async fn remove(&self, instance_id: &InstanceId, key_id: &str) -> Result<()>;
}

#[async_trait]
impl<S> EncryptionKeyStore for std::sync::Arc<S>
where
    S: EncryptionKeyStore + ?Sized,
{
    async fn add(&self, key: EncryptionKey) -> Result<()> {
        (**self).add(key).await
    }

    async fn get(
        &self,
        instance_id: &InstanceId,
        id_or_identifier: &str,
    ) -> Result<Option<EncryptionKey>> {
        (**self).get(instance_id, id_or_identifier).await
    }

    async fn list(
        &self,
        instance_id: &InstanceId,
        algorithm: Option<&str>,
    ) -> Result<Vec<EncryptionKey>> {
        (**self).list(instance_id, algorithm).await
    }

    async fn remove(&self, instance_id: &InstanceId, key_id: &str) -> Result<()> {
        (**self).remove(instance_id, key_id).await
    }
}

/// In-memory key store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: Mutex<HashMap<(InstanceId, String), EncryptionKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EncryptionKeyStore for InMemoryKeyStore {
    async fn add(&self, key: EncryptionKey) -> Result<()> {
        let mut keys = lock(&self.keys)?;
        let duplicate = keys.values().any(|k| {
            k.instance_id == key.instance_id && k.identifier == key.identifier
        });
        if duplicate {
            return Err(Error::already_exists(
                "CRYPTO-ks01",
                format!("encryption key identifier '{}' already exists", key.identifier),
            ));
        }
        keys.insert((key.instance_id.clone(), key.key_id.clone()), key);
        Ok(())
    }

    async fn get(
        &self,
        instance_id: &InstanceId,
        id_or_identifier: &str,
    ) -> Result<Option<EncryptionKey>> {
        let keys = lock(&self.keys)?;
        Ok(keys
            .values()
            .find(|k| {
                &k.instance_id == instance_id
                    && (k.key_id == id_or_identifier || k.identifier == id_or_identifier)
            })
            .cloned())
    }

    async fn list(
        &self,
        instance_id: &InstanceId,
        algorithm: Option<&str>,
    ) -> Result<Vec<EncryptionKey>> {
        let keys = lock(&self.keys)?;
        let mut result: Vec<EncryptionKey> = keys
            .values()
            .filter(|k| {
                &k.instance_id == instance_id
                    && algorithm.is_none_or(|a| k.algorithm == a)
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(result)
    }

    async fn remove(&self, instance_id: &InstanceId, key_id: &str) -> Result<()> {
        let mut keys = lock(&self.keys)?;
        keys.remove(&(instance_id.clone(), key_id.to_string()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::internal("CRYPTO-ks02", "key store lock poisoned"))
}

/// Postgres-backed key store.
#[derive(Debug, Clone)]
pub struct PostgresKeyStore {
    pool: PgPool,
}

impl PostgresKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS encryption_keys (
                instance_id  TEXT NOT NULL,
                key_id       TEXT NOT NULL,
                identifier   TEXT NOT NULL,
                algorithm    TEXT NOT NULL,
                key_material BYTEA NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (instance_id, key_id),
                UNIQUE (instance_id, identifier)
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
impl EncryptionKeyStore for PostgresKeyStore {
    async fn add(&self, key: EncryptionKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encryption_keys (
                instance_id, key_id, identifier, algorithm, key_material, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(key.instance_id.as_str())
        .bind(&key.key_id)
        .bind(&key.identifier)
        .bind(&key.algorithm)
        .bind(&key.key_material)
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("add", &e))?;
        Ok(())
    }

    async fn get(
        &self,
        instance_id: &InstanceId,
        id_or_identifier: &str,
    ) -> Result<Option<EncryptionKey>> {
        let row = sqlx::query(
            r#"
            SELECT instance_id, key_id, identifier, algorithm, key_material, created_at
            FROM encryption_keys
            WHERE instance_id = $1 AND (key_id = $2 OR identifier = $2)
            "#,
        )
        .bind(instance_id.as_str())
        .bind(id_or_identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", &e))?;
        row.map(|r| decode_key(&r)).transpose()
    }

    async fn list(
        &self,
        instance_id: &InstanceId,
        algorithm: Option<&str>,
    ) -> Result<Vec<EncryptionKey>> {
        let rows = match algorithm {
            Some(alg) => {
                sqlx::query(
                    r#"
                    SELECT instance_id, key_id, identifier, algorithm, key_material, created_at
                    FROM encryption_keys
                    WHERE instance_id = $1 AND algorithm = $2
                    ORDER BY identifier
                    "#,
                )
                .bind(instance_id.as_str())
                .bind(alg)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT instance_id, key_id, identifier, algorithm, key_material, created_at
                    FROM encryption_keys
                    WHERE instance_id = $1
                    ORDER BY identifier
                    "#,
                )
                .bind(instance_id.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("list", &e))?;
        rows.iter().map(decode_key).collect()
    }

    async fn remove(&self, instance_id: &InstanceId, key_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM encryption_keys WHERE instance_id = $1 AND key_id = $2")
            .bind(instance_id.as_str())
            .bind(key_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", &e))?;
        Ok(())
    }
}

fn decode_key(row: &sqlx::postgres::PgRow) -> Result<EncryptionKey> {
    Ok(EncryptionKey {
        instance_id: InstanceId::new(
            row.try_get::<String, _>("instance_id")
                .map_err(|e| map_sqlx_error("decode", &e))?,
        ),
        key_id: row.try_get("key_id").map_err(|e| map_sqlx_error("decode", &e))?,
        identifier: row.try_get("identifier").map_err(|e| map_sqlx_error("decode", &e))?,
        algorithm: row.try_get("algorithm").map_err(|e| map_sqlx_error("decode", &e))?,
        key_material: row.try_get("key_material").map_err(|e| map_sqlx_error("decode", &e))?,
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("decode", &e))?,
    })
}

fn map_sqlx_error(op: &str, err: &sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Error::already_exists("CRYPTO-ks03", format!("{op}: identifier already exists"))
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::unavailable("CRYPTO-ks04", format!("{op}: storage unavailable ({err})"))
        }
        _ => Error::internal("CRYPTO-ks05", format!("{op}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(identifier: &str, algorithm: &str) -> EncryptionKey {
        EncryptionKey {
            instance_id: InstanceId::new("i1"),
            key_id: idforge_core::id::generate(),
            identifier: identifier.to_string(),
            algorithm: algorithm.to_string(),
            key_material: vec![1, 2, 3],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn identifier_unique_per_instance() {
        let store = InMemoryKeyStore::new();
        store.add(key("otp", "aes256")).await.unwrap();
        let err = store.add(key("otp", "aes256")).await.unwrap_err();
        assert_eq!(err.kind, idforge_core::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn get_by_id_or_identifier() {
        let store = InMemoryKeyStore::new();
        let k = key("smtp", "aes256");
        let key_id = k.key_id.clone();
        store.add(k).await.unwrap();

        let by_identifier = store.get(&InstanceId::new("i1"), "smtp").await.unwrap();
        assert!(by_identifier.is_some());
        let by_id = store.get(&InstanceId::new("i1"), &key_id).await.unwrap();
        assert!(by_id.is_some());
        assert!(store.get(&InstanceId::new("i2"), "smtp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_algorithm() {
        let store = InMemoryKeyStore::new();
        store.add(key("a", "aes256")).await.unwrap();
        store.add(key("b", "hmac")).await.unwrap();
        assert_eq!(store.list(&InstanceId::new("i1"), None).await.unwrap().len(), 2);
        assert_eq!(
            store.list(&InstanceId::new("i1"), Some("hmac")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = InMemoryKeyStore::new();
        let k = key("c", "aes256");
        let key_id = k.key_id.clone();
        store.add(k).await.unwrap();
        store.remove(&InstanceId::new("i1"), &key_id).await.unwrap();
        store.remove(&InstanceId::new("i1"), &key_id).await.unwrap();
        assert!(store.get(&InstanceId::new("i1"), "c").await.unwrap().is_none());
    }
}
