//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheKey, Response};
use crate::db::Database;

/// A single cached response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for named cache stores.
pub trait CacheStore: Send + Sync {
  /// Create the named cache if it does not exist yet.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Store every entry in one atomic batch, replacing entries with the same key.
  fn put_all(&self, cache_name: &str, entries: &[(CacheKey, Response)]) -> Result<()>;

  /// Look up a stored response by key.
  fn lookup(&self, cache_name: &str, key: &CacheKey) -> Result<Option<CachedResponse>>;

  /// Keys in the named cache, oldest write first.
  fn keys(&self, cache_name: &str) -> Result<Vec<CacheKey>>;
}

/// SQLite-based cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the given path, creating it if needed.
  pub fn open_at(path: &Path) -> Result<Self> {
    let db = Database::open(path)?;
    Ok(Self::from_database(db))
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Database::default_path()?)
  }

  /// A store that lives only as long as this value.
  #[cfg(test)]
  pub fn in_memory() -> Result<Self> {
    Ok(Self::from_database(Database::open_in_memory()?))
  }

  fn from_database(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }
}

impl CacheStore for SqliteStore {
  fn open(&self, cache_name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO caches (name) VALUES (?)",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

    Ok(())
  }

  fn put_all(&self, cache_name: &str, entries: &[(CacheKey, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

    for (key, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers for {}: {}", key, e))?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries
           (cache_name, method, url, response_url, status, status_text, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          cache_name,
          key.method,
          key.url,
          response.url,
          response.status,
          response.status_text,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;
    }

    // Dropping an uncommitted transaction rolls it back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn lookup(&self, cache_name: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT response_url, status, status_text, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND method = ? AND url = ?",
        params![cache_name, key.method, key.url],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    let Some((url, status, status_text, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;

    Ok(Some(CachedResponse {
      response: Response {
        url,
        status,
        status_text,
        headers,
        body,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn keys(&self, cache_name: &str) -> Result<Vec<CacheKey>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT method, url FROM cache_entries
         WHERE cache_name = ?
         ORDER BY rowid",
      )
      .map_err(|e| eyre!("Failed to prepare key query: {}", e))?;

    let keys = stmt
      .query_map(params![cache_name], |row| {
        Ok(CacheKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to query keys: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read keys: {}", e))?;

    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
