use std::path::Path;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Stable keys of the persisted layout.
pub const TRANSACTIONS_KEY: &str = "transactions";
pub const VERSION_KEY: &str = "ledger_version";
pub const BACKUP_KEY: &str = "ledger_backup";
/// Present while restored data must not be migrated automatically.
pub const HOLD_KEY: &str = "ledger_restore_hold";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);
";

#[derive(Debug, Clone)]
pub enum StoreOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StoreOp {
    pub fn set(key: &str, value: String) -> Self {
        Self::Set {
            key: key.to_string(),
            value,
        }
    }

    pub fn remove(key: &str) -> Self {
        Self::Remove {
            key: key.to_string(),
        }
    }
}

/// Persistent string store addressed by key. `apply` is all-or-nothing.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn apply(&self, ops: &[StoreOp]) -> Result<()>;
}

pub fn read_json<T: DeserializeOwned>(store: &impl Store, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize + ?Sized>(store: &impl Store, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}

pub fn json_op<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<StoreOp> {
    Ok(StoreOp::set(key, serde_json::to_string(value)?))
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Copy the whole database file to `dest_path`, returning its size in bytes.
    pub fn snapshot_to(&self, dest_path: &Path) -> Result<u64> {
        let mut dest_conn = Connection::open(dest_path)?;
        let backup = Backup::new(&self.conn, &mut dest_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(std::fs::metadata(dest_path)?.len())
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    fn apply(&self, ops: &[StoreOp]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for op in ops {
            match op {
                StoreOp::Set { key, value } => {
                    tx.execute(
                        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        rusqlite::params![key, value],
                    )?;
                }
                StoreOp::Remove { key } => {
                    tx.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory fake
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use memory::MemoryStore;
