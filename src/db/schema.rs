//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::types::HeraldError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), HeraldError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, HeraldError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS herald_schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| HeraldError::Database(format!("Failed to create schema version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM herald_schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| HeraldError::Database(format!("Failed to read schema version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), HeraldError> {
    conn.execute("DELETE FROM herald_schema_version", [])
        .map_err(|e| HeraldError::Database(format!("Failed to clear schema version: {}", e)))?;
    conn.execute("INSERT INTO herald_schema_version (version) VALUES (?)", [version])
        .map_err(|e| HeraldError::Database(format!("Failed to set schema version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), HeraldError> {
    conn.execute_batch(INBOX_SCHEMA)
        .map_err(|e| HeraldError::Database(format!("Failed to create inbox tables: {}", e)))?;

    conn.execute_batch(PLATFORM_SCHEMA)
        .map_err(|e| HeraldError::Database(format!("Failed to create platform tables: {}", e)))?;

    Ok(())
}

/// Tables written by Herald
const INBOX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notification_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- anchor: claim, argument, comment or reward cause
    type_id INTEGER NOT NULL,
    address TEXT NOT NULL,
    user_profile_id INTEGER NOT NULL,
    sender_profile_id INTEGER,
    message TEXT NOT NULL,
    action TEXT NOT NULL DEFAULT '',
    source_event TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    type INTEGER NOT NULL,
    meta TEXT NOT NULL DEFAULT '{}',
    read INTEGER NOT NULL DEFAULT 0,
    seen INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notification_events_address ON notification_events(address);
CREATE INDEX IF NOT EXISTS idx_notification_events_recipient ON notification_events(user_profile_id, read, seen);

CREATE TABLE IF NOT EXISTS device_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    token TEXT NOT NULL,
    platform TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_device_tokens_unique ON device_tokens(address, token, platform);
"#;

/// Platform tables Herald only reads; created here so a fresh deployment
/// (and the test suite) has them
const PLATFORM_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    address TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS claims (
    id INTEGER PRIMARY KEY,
    creator TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS arguments (
    id INTEGER PRIMARY KEY,
    claim_id INTEGER NOT NULL,
    creator TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_arguments_claim ON arguments(claim_id);

CREATE TABLE IF NOT EXISTS stakes (
    id INTEGER PRIMARY KEY,
    argument_id INTEGER NOT NULL,
    creator TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stakes_argument ON stakes(argument_id);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY,
    claim_id INTEGER NOT NULL,
    argument_id INTEGER,
    element_id INTEGER,
    creator TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_comments_scope ON comments(claim_id, argument_id, element_id);

CREATE TABLE IF NOT EXISTS featured_claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    claim_id INTEGER NOT NULL
);
"#;
