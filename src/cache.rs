//! Cache-aside reads for paginated listings.
//!
//! Entries expire after a fixed TTL and are never invalidated by writes, so a
//! listing can lag a mutation by up to that TTL. The cache may also be down:
//! a failed read falls through to the store and a failed write is only logged.
use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value cache service. Keys and values are opaque strings.
pub trait CacheService {
    /// `Ok(None)` is a miss.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache service with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheService for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.expires_at > now {
                Some(entry.value.clone())
            } else {
                None
            }
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(hit)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Cache service kept in a `cache_entries` table, so entries survive the
/// process and are shared by everything that opens the same file.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(unavailable)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(unavailable)?;
        Ok(SqliteCache { conn })
    }
}

fn unavailable(err: rusqlite::Error) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

impl CacheService for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Utc::now().timestamp_millis();
        let hit = self
            .conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(unavailable)?;
        if hit.is_none() {
            self.conn
                .execute(
                    "DELETE FROM cache_entries WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )
                .map_err(unavailable)?;
        }
        Ok(hit)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        self.conn
            .execute(
                "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .map_err(unavailable)?;
        Ok(())
    }
}

/// Where a listing was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Store,
}

/// Key for a listing: the route path followed by the query string as given.
/// No reordering or normalization happens, so `a=1&b=2` and `b=2&a=1` are
/// different keys.
pub fn cache_key(path: &str, query: &str) -> String {
    format!("{}?{}", path, query)
}

pub struct QueryCache<C> {
    service: C,
    ttl: Duration,
}

impl<C: CacheService> QueryCache<C> {
    pub fn new(service: C) -> Self {
        Self::with_ttl(service, DEFAULT_TTL)
    }

    pub fn with_ttl(service: C, ttl: Duration) -> Self {
        Self { service, ttl }
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    /// Return the cached list for `key`, or run `loader` and cache its result.
    ///
    /// Only `loader` errors propagate.
    pub fn cached_list<T, E, F>(&self, key: &str, loader: F) -> Result<(Vec<T>, Source), E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Vec<T>, E>,
    {
        match self.service.get(key) {
            Ok(Some(payload)) => match serde_json::from_str::<Vec<T>>(&payload) {
                Ok(items) => {
                    info!(source = "cache", key, "cached resource");
                    return Ok((items, Source::Cache));
                }
                Err(e) => warn!(key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(e) => warn!(key, error = %e, "cache read failed, loading from store"),
        }

        let items = loader()?;

        match serde_json::to_string(&items) {
            Ok(payload) => {
                if let Err(e) = self.service.set(key, payload, self.ttl) {
                    warn!(key, error = %e, "cache write failed, serving uncached result");
                }
            }
            Err(e) => warn!(key, error = %e, "could not serialize listing for cache"),
        }

        Ok((items, Source::Store))
    }
}
