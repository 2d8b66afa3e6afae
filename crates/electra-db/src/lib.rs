pub mod clock;
pub mod config;
pub mod error;
pub mod migrations;
mod models;
mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{Result, StoreError};

/// The poll store: one long-lived SQLite connection, serialized behind a mutex.
///
/// Every write runs in its own transaction, so a failed operation leaves
/// nothing behind.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        Self::open(&config.db_path)
    }

    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode so reads don't block on the writer
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn, clock)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(mut conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Current time in Unix milliseconds, as seen by this store.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }

    /// Create the base tables if missing. Safe to call repeatedly.
    pub fn create_schema(&self) -> Result<()> {
        self.with_conn_mut(migrations::create_schema)
    }

    pub fn upgrade_schema(&self, old_version: u32, new_version: u32) -> Result<()> {
        self.with_conn_mut(|conn| migrations::upgrade_schema(conn, old_version, new_version))
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(migrations::current_version)
    }
}
