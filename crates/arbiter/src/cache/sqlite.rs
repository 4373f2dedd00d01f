//! SQLite-backed durable tier.
//!
//! Connections come from a bounded r2d2 pool with a checkout timeout,
//! acquired once at startup and shared across all requests. Diesel calls
//! are blocking, so every operation runs under `spawn_blocking`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use log::warn;

use crate::errors::ArbiterError;
use crate::models::CacheEntry;

use super::tier::DurableTier;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

diesel::table! {
    cache_entries (key) {
        key -> Text,
        payload -> Text,
        confidence -> Double,
        written_at -> BigInt,
        ttl_seconds -> BigInt,
        source_provider -> Text,
    }
}

use cache_entries::dsl;

#[derive(Queryable, Insertable)]
#[diesel(table_name = cache_entries)]
struct CacheRow {
    key: String,
    payload: String,
    confidence: f64,
    written_at: i64,
    ttl_seconds: i64,
    source_provider: String,
}

impl CacheRow {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            payload: entry.value.to_string(),
            confidence: entry.confidence,
            written_at: entry.written_at.timestamp(),
            ttl_seconds: entry.ttl_seconds as i64,
            source_provider: entry.source_provider.clone(),
        }
    }

    fn into_entry(self) -> Option<CacheEntry> {
        let value = match serde_json::from_str(&self.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding unreadable cache payload for '{}': {}", self.key, e);
                return None;
            }
        };
        let written_at = DateTime::<Utc>::from_timestamp(self.written_at, 0)?;
        Some(CacheEntry {
            key: self.key,
            value,
            confidence: self.confidence,
            written_at,
            ttl_seconds: self.ttl_seconds.max(0) as u64,
            source_provider: self.source_provider,
        })
    }
}

/// Durable tier backed by a SQLite database.
pub struct SqliteTier {
    pool: DbPool,
}

impl SqliteTier {
    /// Open (or create) the backing database.
    ///
    /// The pool is the shared, long-lived connection resource for this
    /// tier: bounded at `pool_size` with `checkout_timeout` on checkout.
    pub fn new(
        database_url: &str,
        pool_size: u32,
        checkout_timeout: Duration,
    ) -> Result<Self, ArbiterError> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(checkout_timeout)
            .build(manager)
            .map_err(|e| ArbiterError::cache(format!("pool init failed: {}", e)))?;

        let tier = Self { pool };
        tier.ensure_schema()?;
        Ok(tier)
    }

    fn ensure_schema(&self) -> Result<(), ArbiterError> {
        let mut conn = self.conn()?;
        diesel::sql_query(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY NOT NULL,
                payload TEXT NOT NULL,
                confidence DOUBLE NOT NULL,
                written_at BIGINT NOT NULL,
                ttl_seconds BIGINT NOT NULL,
                source_provider TEXT NOT NULL
            )",
        )
        .execute(&mut conn)
        .map_err(|e| ArbiterError::cache(format!("schema init failed: {}", e)))?;
        Ok(())
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<SqliteConnection>>, ArbiterError>
    {
        self.pool
            .get()
            .map_err(|e| ArbiterError::cache(format!("connection checkout failed: {}", e)))
    }

    /// Run a blocking pool operation on the blocking thread pool.
    async fn run<T, F>(&self, op: F) -> Result<T, ArbiterError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, ArbiterError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| ArbiterError::cache(format!("connection checkout failed: {}", e)))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| ArbiterError::cache(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl DurableTier for SqliteTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, ArbiterError> {
        let lookup = key.to_string();
        self.run(move |conn| {
            let row: Option<CacheRow> = dsl::cache_entries
                .filter(dsl::key.eq(&lookup))
                .first(conn)
                .optional()
                .map_err(|e| ArbiterError::cache(e.to_string()))?;
            Ok(row.and_then(CacheRow::into_entry))
        })
        .await
    }

    async fn get_batch(&self, keys: &[String]) -> Result<Vec<Option<CacheEntry>>, ArbiterError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let lookups = keys.to_vec();
        self.run(move |conn| {
            let rows: Vec<CacheRow> = dsl::cache_entries
                .filter(dsl::key.eq_any(&lookups))
                .load(conn)
                .map_err(|e| ArbiterError::cache(e.to_string()))?;

            let mut by_key: std::collections::HashMap<String, CacheEntry> = rows
                .into_iter()
                .filter_map(|row| row.into_entry().map(|e| (e.key.clone(), e)))
                .collect();
            Ok(lookups.iter().map(|k| by_key.remove(k)).collect())
        })
        .await
    }

    async fn set(&self, entry: &CacheEntry) -> Result<(), ArbiterError> {
        let row = CacheRow::from_entry(entry);
        self.run(move |conn| {
            diesel::replace_into(cache_entries::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| ArbiterError::cache(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn set_batch(&self, entries: &[CacheEntry]) -> Result<usize, ArbiterError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let rows: Vec<CacheRow> = entries.iter().map(CacheRow::from_entry).collect();
        self.run(move |conn| {
            diesel::replace_into(cache_entries::table)
                .values(&rows)
                .execute(conn)
                .map_err(|e| ArbiterError::cache(e.to_string()))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), ArbiterError> {
        let lookup = key.to_string();
        self.run(move |conn| {
            diesel::delete(dsl::cache_entries.filter(dsl::key.eq(&lookup)))
                .execute(conn)
                .map_err(|e| ArbiterError::cache(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), ArbiterError> {
        self.run(move |conn| {
            diesel::delete(dsl::cache_entries)
                .execute(conn)
                .map_err(|e| ArbiterError::cache(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, ArbiterError> {
        let now = Utc::now().timestamp();
        self.run(move |conn| {
            diesel::delete(
                dsl::cache_entries.filter((dsl::written_at + dsl::ttl_seconds).le(now)),
            )
            .execute(conn)
            .map_err(|e| ArbiterError::cache(e.to_string()))
        })
        .await
    }
}
