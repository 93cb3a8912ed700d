pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

pub use error::{StoreError, StoreResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Mutable access for multi-statement transactions. The single writer
    /// mutex serializes all writes, so capacity and state-machine checks
    /// inside one closure cannot race each other.
    pub fn with_conn_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

/// Timestamp format stored in TEXT columns. Millisecond precision, no zone
/// suffix, lexically ordered so it compares the same in SQL and as strings.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn to_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|_| s.parse().unwrap_or_default())
}
