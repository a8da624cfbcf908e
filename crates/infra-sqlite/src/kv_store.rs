// SQLite KeyValueStore Implementation
//
// Every operation is one SQL statement, so each is atomic per key even when
// several processes share the database file. Expiry is evaluated against
// the injected clock on every read and write.

use crate::error::store_error;
use async_trait::async_trait;
use gatekeeper_core::error::Result;
use gatekeeper_core::port::{KeyValueStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Delete rows whose expiry passed. Reads already ignore them; this only
    /// reclaims space. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let result =
            sqlx::query("DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "Purged expired keys");
        }
        Ok(purged)
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        let now = self.time_provider.now_millis();
        // Expired rows restart from zero without an expiry, like a fresh key
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO kv_store (key, value, expires_at)
            VALUES (?1, CAST(?2 AS TEXT), NULL)
            ON CONFLICT(key) DO UPDATE SET
                value = CAST(
                    CASE WHEN kv_store.expires_at IS NOT NULL AND kv_store.expires_at <= ?3
                         THEN ?2
                         ELSE CAST(kv_store.value AS INTEGER) + ?2
                    END AS TEXT),
                expires_at =
                    CASE WHEN kv_store.expires_at IS NOT NULL AND kv_store.expires_at <= ?3
                         THEN NULL
                         ELSE kv_store.expires_at
                    END
            RETURNING CAST(value AS INTEGER)
            "#,
        )
        .bind(key)
        .bind(delta)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(value)
    }
}

fn expiry_at(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(ttl.as_millis() as i64)
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.time_provider.now_millis();
        sqlx::query_scalar(
            "SELECT value FROM kv_store WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.add(key, -1).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.time_provider.now_millis();
        // Only an expired holder row may be overwritten
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            WHERE kv_store.expires_at IS NOT NULL AND kv_store.expires_at <= ?4
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry_at(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE kv_store SET expires_at = ?1
            WHERE key = ?2 AND (expires_at IS NULL OR expires_at > ?3)
            "#,
        )
        .bind(expiry_at(now, ttl))
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let live: Option<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM kv_store WHERE key = ?1
            RETURNING CASE WHEN expires_at IS NULL OR expires_at > ?2 THEN 1 ELSE 0 END
            "#,
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(live == Some(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use gatekeeper_core::port::time_provider::mocks::ManualClock;

    async fn setup() -> (Arc<ManualClock>, SqliteKeyValueStore) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let store = SqliteKeyValueStore::new(pool, clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let (_, store) = setup().await;
        assert_eq!(store.get("k").await.unwrap(), None);

        assert!(store
            .set_if_absent("k", "v", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let (_, store) = setup().await;
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.decr("c").await.unwrap(), 1);
        assert_eq!(store.decr("fresh").await.unwrap(), -1);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_incr_keeps_expiry_and_restarts_after_it() {
        let (clock, store) = setup().await;
        store.incr("c").await.unwrap();
        assert!(store.expire("c", Duration::from_secs(10)).await.unwrap());

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.incr("c").await.unwrap(), 2);

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.get("c").await.unwrap(), None);
        assert_eq!(store.incr("c").await.unwrap(), 1);

        // The restarted counter carries no expiry
        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let (clock, store) = setup().await;
        let ttl = Duration::from_secs(30);

        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));

        clock.advance(ttl);
        assert!(store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_set_if_absent_does_not_take_persistent_key() {
        let (_, store) = setup().await;
        // A counter-style key carries no expiry
        store.incr("lock").await.unwrap();
        assert!(!store
            .set_if_absent("lock", "x", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expire_zero_and_absent() {
        let (_, store) = setup().await;
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());

        store.incr("c").await.unwrap();
        assert!(store.expire("c", Duration::ZERO).await.unwrap());
        assert_eq!(store.get("c").await.unwrap(), None);
        assert!(!store.delete("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, store) = setup().await;
        store.incr("keep").await.unwrap();
        store
            .set_if_absent("gone", "1", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.get("keep").await.unwrap().as_deref(), Some("1"));
    }
}
