//! SQLite-backed key store
//!
//! Holds key material blobs in a single `key_value` table of the local
//! database. Values are only ever read on this device.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::crypto::errors::StoreError;
use crate::crypto::store::KeyStore;

pub struct SqliteKeyStore {
    db: SqlitePool,
}

impl SqliteKeyStore {
    /// Wrap `db`, creating the table if it does not exist yet
    pub async fn new(db: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS key_value (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db })
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = sqlx::query(r#"SELECT value FROM key_value WHERE key = $1"#)
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

        Ok(result.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO key_value (key, value, updated_at)
            VALUES ($1, $2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query(r#"DELETE FROM key_value WHERE key = $1"#)
            .bind(key)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::store::identity_key;
    use crate::crypto::IdentityCrypto;
    use crate::db::open_memory_pool;
    use std::sync::Arc;

    async fn store() -> SqliteKeyStore {
        SqliteKeyStore::new(open_memory_pool().await.unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = store().await;
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"one").await.unwrap();
        store.set("k", b"two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identity_persists_in_sqlite() {
        let pool = open_memory_pool().await.unwrap();
        let store = Arc::new(SqliteKeyStore::new(pool.clone()).await.unwrap());

        let first = IdentityCrypto::new(store.clone(), "alice")
            .public_key()
            .await
            .unwrap();
        assert!(store.get(&identity_key("alice")).await.unwrap().is_some());

        let reopened = Arc::new(SqliteKeyStore::new(pool).await.unwrap());
        let second = IdentityCrypto::new(reopened, "alice")
            .public_key()
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
