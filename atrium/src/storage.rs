//! SQLite-backed storage.
//!
//! This module provides:
//! - Per-app SQL storage with explicit transactions and query results held
//!   by query hash until the next frame
//! - The host key/value store (`host.sqlite`): environment values and GUI
//!   settings blobs keyed by (app, hostname)

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use trellis::content_hash;

use crate::error::HostError;

/// Database version for migrations.
const SCHEMA_VERSION: i32 = 1;

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    Connection::open(path).with_context(|| format!("Failed to open database: {:?}", path))
}

// =========================================================================
// App storage
// =========================================================================

/// Rows of one query, each encoded as a JSON array.
#[derive(Debug, Default)]
struct QueryResult {
    rows: Vec<Vec<u8>>,
}

/// SQL database owned by one app.
pub struct AppStorage {
    conn: Connection,
    in_transaction: bool,
    results: HashMap<u64, QueryResult>,
}

impl AppStorage {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_connection(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self { conn, in_transaction: false, results: HashMap::new() }
    }

    /// Drop query results of the previous frame.
    pub fn begin_frame(&mut self) {
        self.results.clear();
    }

    /// Run statements inside the open transaction (started on first write).
    /// Returns the number of rows changed by the last statement.
    pub fn write(&mut self, sql: &str) -> std::result::Result<u64, HostError> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        self.results.clear();
        self.conn.execute_batch(sql)?;
        Ok(self.conn.changes() as u64)
    }

    pub fn commit(&mut self) -> std::result::Result<(), HostError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> std::result::Result<(), HostError> {
        self.results.clear();
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Run a query and keep its rows under the query's hash.
    pub fn read(&mut self, sql: &str) -> std::result::Result<u64, HostError> {
        let hash = content_hash(sql.as_bytes());
        if self.results.contains_key(&hash) {
            return Ok(hash);
        }
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut result = QueryResult::default();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                values.push(json_value(row.get_ref(i)?));
            }
            let encoded = serde_json::to_vec(&values).map_err(|e| HostError::Other(e.to_string()))?;
            result.rows.push(encoded);
        }
        tracing::debug!(hash, rows = result.rows.len(), "query stored");
        self.results.insert(hash, result);
        Ok(hash)
    }

    pub fn row_count(&self, query: u64) -> Option<usize> {
        self.results.get(&query).map(|r| r.rows.len())
    }

    /// Encoded length of one row.
    pub fn row_len(&self, query: u64, row: usize) -> Option<usize> {
        self.row(query, row).map(<[u8]>::len)
    }

    pub fn row(&self, query: u64, row: usize) -> Option<&[u8]> {
        self.results.get(&query)?.rows.get(row).map(Vec::as_slice)
    }
}

fn json_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

// =========================================================================
// Host key/value store
// =========================================================================

/// The shared `host.sqlite` database.
pub struct HostStore {
    conn: Connection,
    hostname: String,
}

impl HostStore {
    /// Open or create the store, keyed to this machine's hostname.
    pub fn open(path: &Path) -> Result<Self> {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self::open_as(path, hostname)
    }

    /// Open with an explicit hostname (several machines share one file).
    pub fn open_as(path: &Path, hostname: impl Into<String>) -> Result<Self> {
        let mut store = Self { conn: open_connection(path)?, hostname: hostname.into() };
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self { conn: Connection::open_in_memory()?, hostname: "local".into() };
        store.initialize()?;
        Ok(store)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn initialize(&mut self) -> Result<()> {
        let version = self.get_schema_version()?;
        if version == 0 {
            self.create_schema()?;
        } else if version < SCHEMA_VERSION {
            tracing::info!(version, "migrating host store");
        }
        Ok(())
    }

    fn get_schema_version(&self) -> Result<i32> {
        let exists: bool = self
            .conn
            .query_row("SELECT 1 FROM sqlite_master WHERE type='table' AND name='meta'", [], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Ok(0);
        }
        let version = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| {
                let v: String = row.get(0)?;
                Ok(v.parse().unwrap_or(0))
            })
            .optional()?
            .unwrap_or(0);
        Ok(version)
    }

    fn create_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Environment values set by apps
            CREATE TABLE IF NOT EXISTS env (
                app TEXT NOT NULL,
                host TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (app, host, key)
            );

            -- Layout settings per app (same JSON shape as layouts/Root.json)
            CREATE TABLE IF NOT EXISTS gui (
                app TEXT NOT NULL,
                host TEXT NOT NULL,
                settings BLOB NOT NULL,
                PRIMARY KEY (app, host)
            );

            INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');
            "#,
        )?;
        Ok(())
    }

    pub fn env_get(&self, app: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM env WHERE app = ?1 AND host = ?2 AND key = ?3",
                params![app, self.hostname, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn env_set(&self, app: &str, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO env (app, host, key, value) VALUES (?1, ?2, ?3, ?4)",
            params![app, self.hostname, key, value],
        )?;
        Ok(())
    }

    pub fn gui_load(&self, app: &str) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT settings FROM gui WHERE app = ?1 AND host = ?2",
                params![app, self.hostname],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn gui_save(&self, app: &str, settings: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO gui (app, host, settings) VALUES (?1, ?2, ?3)",
            params![app, self.hostname, settings],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_commit_read_rows() {
        let mut s = AppStorage::open_in_memory().unwrap();
        s.write("CREATE TABLE notes (id INTEGER, body TEXT, score REAL)").unwrap();
        s.write("INSERT INTO notes VALUES (1, 'first', 0.5), (2, NULL, 2.0)").unwrap();
        s.commit().unwrap();

        let q = s.read("SELECT id, body, score FROM notes ORDER BY id").unwrap();
        assert_eq!(s.row_count(q), Some(2));
        assert_eq!(s.row(q, 0), Some(&br#"[1,"first",0.5]"#[..]));
        assert_eq!(s.row(q, 1), Some(&br#"[2,null,2.0]"#[..]));
        assert_eq!(s.row_len(q, 0), Some(15));
        assert_eq!(s.row(q, 2), None);
        assert_eq!(s.row_count(q ^ 1), None);
    }

    #[test]
    fn rollback_discards_writes() {
        let mut s = AppStorage::open_in_memory().unwrap();
        s.write("CREATE TABLE t (v INTEGER)").unwrap();
        s.commit().unwrap();
        s.write("INSERT INTO t VALUES (1)").unwrap();
        s.rollback().unwrap();
        let q = s.read("SELECT v FROM t").unwrap();
        assert_eq!(s.row_count(q), Some(0));
    }

    #[test]
    fn bad_sql_is_an_error_not_a_panic() {
        let mut s = AppStorage::open_in_memory().unwrap();
        assert!(s.read("SELEC nonsense").is_err());
        assert!(s.write("INSERT INTO missing VALUES (1)").is_err());
        s.rollback().unwrap();
    }

    #[test]
    fn results_live_for_one_frame() {
        let mut s = AppStorage::open_in_memory().unwrap();
        let q = s.read("SELECT 1").unwrap();
        assert_eq!(s.row_count(q), Some(1));
        s.begin_frame();
        assert_eq!(s.row_count(q), None);
    }

    #[test]
    fn env_is_keyed_by_app_and_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sqlite");
        let a = HostStore::open_as(&path, "alpha").unwrap();
        a.env_set("notes", "theme", b"dark").unwrap();
        a.gui_save("notes", b"{}").unwrap();
        assert_eq!(a.env_get("notes", "theme").unwrap().as_deref(), Some(&b"dark"[..]));
        assert_eq!(a.env_get("other", "theme").unwrap(), None);

        let b = HostStore::open_as(&path, "beta").unwrap();
        assert_eq!(b.env_get("notes", "theme").unwrap(), None);
        assert_eq!(b.gui_load("notes").unwrap(), None);
        assert_eq!(a.gui_load("notes").unwrap().as_deref(), Some(&b"{}"[..]));
    }
}
