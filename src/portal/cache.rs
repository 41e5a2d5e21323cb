use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::{DashboardSnapshot, HiddenFormFields};
use crate::error::PortalError;

/// Default key prefix, matching the portal's historical cache layout.
pub const DEFAULT_KEY_PREFIX: &str = "erp:session:";

/// `<prefix><session id>`, e.g. `erp:session:abc123`.
pub fn cache_key(prefix: &str, session_id: &str) -> String {
    format!("{}{}", prefix, session_id)
}

/// Fixed-width UTC timestamps so string comparison in SQL orders correctly.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `now + ttl_secs`, capped at the end of year 9999. Later instants format
/// with a `+` year prefix, which sorts before every four-digit year.
fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let latest = NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|day| day.and_hms_milli_opt(23, 59, 59, 999))
        .map(|at| at.and_utc())
        .unwrap_or(now);
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .map_or(latest, |at| at.min(latest))
}

/// The JSON document stored per session.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    snapshot: DashboardSnapshot,
    hidden_fields: HiddenFormFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub session_id: String,
    pub snapshot: DashboardSnapshot,
    pub hidden_fields: HiddenFormFields,
    pub cached_at: String,
    pub expires_at: String,
}

/// SQLite-backed session cache with TTL expiry.
/// Blocking; async callers go through [`SessionStore`].
pub struct SessionCache {
    conn: Connection,
    key_prefix: String,
}

impl SessionCache {
    /// Open or create the cache database, creating its parent directory if needed.
    pub fn open(db_path: &Path, key_prefix: &str) -> Result<Self, PortalError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PortalError::Cache(format!("Failed to create cache dir {:?}: {}", parent, e))
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| {
            PortalError::Cache(format!("Failed to open cache database at {:?}: {}", db_path, e))
        })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_cache (
                cache_key TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_session_cache_expires ON session_cache(expires_at);",
        )
        .map_err(|e| PortalError::Cache(format!("Failed to create cache table: {}", e)))?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, session_id: &str) -> String {
        cache_key(&self.key_prefix, session_id)
    }

    /// Live entry for the session, or `None` if absent or expired.
    pub fn get(&self, session_id: &str) -> Result<Option<CacheEntry>, PortalError> {
        let now = timestamp(Utc::now());
        let row = self
            .conn
            .query_row(
                "SELECT payload_json, cached_at, expires_at FROM session_cache
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![self.key(session_id), now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| PortalError::Cache(format!("Cache lookup failed: {}", e)))?;

        let Some((json, cached_at, expires_at)) = row else {
            debug!("Cache miss for session {}", session_id);
            return Ok(None);
        };

        let payload: Payload = serde_json::from_str(&json)
            .map_err(|e| PortalError::Cache(format!("Failed to deserialize cached snapshot: {}", e)))?;
        debug!("Cache hit for session {}", session_id);
        Ok(Some(CacheEntry {
            session_id: session_id.to_string(),
            snapshot: payload.snapshot,
            hidden_fields: payload.hidden_fields,
            cached_at,
            expires_at,
        }))
    }

    /// Store a snapshot for `ttl_secs`. Overwrites any existing entry.
    pub fn put(
        &self,
        session_id: &str,
        snapshot: &DashboardSnapshot,
        hidden_fields: &HiddenFormFields,
        ttl_secs: u64,
    ) -> Result<(), PortalError> {
        let now = Utc::now();
        let expires = expiry_after(now, ttl_secs);
        let json = serde_json::to_string(&Payload {
            snapshot: snapshot.clone(),
            hidden_fields: hidden_fields.clone(),
        })
        .map_err(|e| PortalError::Cache(format!("Failed to serialize snapshot for cache: {}", e)))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO session_cache
                 (cache_key, session_id, payload_json, cached_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    self.key(session_id),
                    session_id,
                    json,
                    timestamp(now),
                    timestamp(expires),
                ],
            )
            .map_err(|e| PortalError::Cache(format!("Failed to store snapshot in cache: {}", e)))?;

        info!("Cached dashboard for session {} (expires in {}s)", session_id, ttl_secs);
        Ok(())
    }

    /// Remove the session's entry. Returns whether one existed.
    pub fn delete(&self, session_id: &str) -> Result<bool, PortalError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM session_cache WHERE cache_key = ?1",
                params![self.key(session_id)],
            )
            .map_err(|e| PortalError::Cache(format!("Failed to delete cache entry: {}", e)))?;
        Ok(count > 0)
    }

    /// Delete all expired entries. Returns the number of deleted rows.
    pub fn clear_expired(&self) -> Result<usize, PortalError> {
        let now = timestamp(Utc::now());
        let count = self
            .conn
            .execute(
                "DELETE FROM session_cache WHERE expires_at <= ?1",
                params![now],
            )
            .map_err(|e| PortalError::Cache(format!("Failed to clear expired cache entries: {}", e)))?;

        info!("Cleared {} expired cache entries", count);
        Ok(count)
    }
}

/// Async face of [`SessionCache`]: every call opens the database on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct SessionStore {
    db_path: PathBuf,
    key_prefix: String,
}

impl SessionStore {
    pub fn new(db_path: PathBuf, key_prefix: impl Into<String>) -> Self {
        Self {
            db_path,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn run<T, F>(&self, op: F) -> Result<T, PortalError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionCache) -> Result<T, PortalError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let prefix = self.key_prefix.clone();
        tokio::task::spawn_blocking(move || {
            let cache = SessionCache::open(&db_path, &prefix)?;
            op(&cache)
        })
        .await
        .map_err(|e| PortalError::Cache(format!("Cache task panicked: {}", e)))?
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<CacheEntry>, PortalError> {
        let session_id = session_id.to_string();
        self.run(move |cache| cache.get(&session_id)).await
    }

    pub async fn put(
        &self,
        session_id: &str,
        snapshot: &DashboardSnapshot,
        hidden_fields: &HiddenFormFields,
        ttl_secs: u64,
    ) -> Result<(), PortalError> {
        let session_id = session_id.to_string();
        let snapshot = snapshot.clone();
        let hidden_fields = hidden_fields.clone();
        self.run(move |cache| cache.put(&session_id, &snapshot, &hidden_fields, ttl_secs))
            .await
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, PortalError> {
        let session_id = session_id.to_string();
        self.run(move |cache| cache.delete(&session_id)).await
    }

    pub async fn clear_expired(&self) -> Result<usize, PortalError> {
        self.run(|cache| cache.clear_expired()).await
    }
}
