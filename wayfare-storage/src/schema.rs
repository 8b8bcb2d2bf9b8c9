//! Versioned schema.
//!
//! The current version lives in `PRAGMA user_version`. Each migration runs in
//! its own transaction together with the version bump, so a crash mid-upgrade
//! leaves the previous version intact and the next open retries it.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Ordered migrations; index `i` upgrades version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[
    // v1: entity collections and the pending-action ledger
    "
    CREATE TABLE IF NOT EXISTS trips (
        key TEXT PRIMARY KEY,
        owner_id TEXT,
        parent_id TEXT,
        slug TEXT,
        synced INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_trips_slug ON trips(slug);
    CREATE INDEX IF NOT EXISTS idx_trips_owner ON trips(owner_id);
    CREATE INDEX IF NOT EXISTS idx_trips_synced ON trips(synced);

    CREATE TABLE IF NOT EXISTS items (
        key TEXT PRIMARY KEY,
        owner_id TEXT,
        parent_id TEXT,
        slug TEXT,
        synced INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id);
    CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id);
    CREATE INDEX IF NOT EXISTS idx_items_slug ON items(slug);
    CREATE INDEX IF NOT EXISTS idx_items_synced ON items(synced);

    CREATE TABLE IF NOT EXISTS pending_actions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        action_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        wall_time INTEGER NOT NULL,
        logical INTEGER NOT NULL,
        retries INTEGER NOT NULL DEFAULT 0,
        entity_key TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pending_order ON pending_actions(wall_time, logical, seq);
    CREATE INDEX IF NOT EXISTS idx_pending_entity ON pending_actions(entity_key);
    ",
    // v2: durable record of evicted actions
    "
    CREATE TABLE IF NOT EXISTS failed_actions (
        id TEXT PRIMARY KEY,
        action TEXT NOT NULL,
        reason TEXT NOT NULL,
        message TEXT NOT NULL,
        failed_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_failed_at ON failed_actions(failed_at);
    ",
];

/// Schema version this build writes.
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

pub(crate) fn current_version(conn: &Connection) -> StorageResult<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version as u32)
}

/// Brings the schema up to [`SCHEMA_VERSION`]. No-op when already current.
pub(crate) fn migrate(conn: &mut Connection) -> StorageResult<()> {
    let from = current_version(conn)?;
    if from > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "database schema v{from} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    if from == SCHEMA_VERSION {
        debug!(version = from, "schema up to date");
        return Ok(());
    }

    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(from as usize) {
        let target = idx as u32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        info!(version = target, "applied schema migration");
    }
    Ok(())
}
