//! SQLite cache implementation

use super::CacheStore;
use crate::model::CacheEntry;
use crate::{Result, TickBridgeError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("tickbridge");
        path.push("cache.db");

        Self {
            path,
            wal_mode: true,
        }
    }
}

/// SQLite-backed cache, one JSON row per credential group
pub struct SqliteCache {
    conn: Mutex<Connection>,
    config: CacheConfig,
}

impl SqliteCache {
    /// Open or create a cache database
    pub fn new(config: CacheConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %config.path.display(), "Opening cache database");

        let conn = Connection::open(&config.path)?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        let cache = Self {
            conn: Mutex::new(conn),
            config,
        };
        cache.init_schema()?;

        Ok(cache)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TickBridgeError::Cache("cache connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                group_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                last_updated INTEGER NOT NULL,
                cached_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Get the cache path
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

impl CacheStore for SqliteCache {
    fn get(&self, group_id: &str) -> Result<Option<CacheEntry>> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM cache_entries WHERE group_id = ?",
                params![group_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Unreadable rows force a rebuild instead of failing every request
                tracing::warn!(group = group_id, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    fn set(&self, group_id: &str, entry: &CacheEntry) -> Result<()> {
        let payload = serde_json::to_string(entry)?;
        let now = Utc::now().timestamp_millis();

        self.conn()?.execute(
            "INSERT OR REPLACE INTO cache_entries (group_id, payload, last_updated, cached_at) VALUES (?, ?, ?, ?)",
            params![
                group_id,
                payload,
                entry.last_updated.timestamp_millis(),
                now
            ],
        )?;

        tracing::debug!(
            group = group_id,
            records = entry.enhancements.len(),
            "Cache entry stored"
        );
        Ok(())
    }

    fn remove(&self, group_id: &str) -> Result<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM cache_entries WHERE group_id = ?",
            params![group_id],
        )?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<()> {
        tracing::info!("Clearing cache");
        self.conn()?.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }

    fn groups(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT group_id FROM cache_entries ORDER BY group_id")?;
        let groups = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(groups)
    }
}
