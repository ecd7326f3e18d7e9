//! SQLite storage for the notification inbox
//!
//! Herald owns two tables and reads several the platform owns:
//!
//! - `notification_events` - inbox rows with read/seen flags (owned)
//! - `device_tokens` - push targets per address (owned)
//! - `accounts`, `claims`, `arguments`, `stakes`, `comments`,
//!   `featured_claims` - platform data read through [`SqliteDirectory`]
//!
//! Writes are single-row inserts or single-statement updates scoped by
//! recipient; nothing here opens a multi-row transaction.

pub mod devices;
pub mod directory;
pub mod notifications;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::types::HeraldError;

pub use devices::{Device, Platform};
pub use directory::SqliteDirectory;

/// SQLite database shared by the inbox writer and the read-state API
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, HeraldError> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| HeraldError::Database(format!("Failed to open SQLite: {}", e)))?;

        // WAL keeps counter reads from blocking the inbox writers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| HeraldError::Database(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, HeraldError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            HeraldError::Database(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), HeraldError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run an operation with exclusive access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HeraldError>
    where
        F: FnOnce(&Connection) -> Result<T, HeraldError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HeraldError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }
}
