//! The local store: entity collections plus the pending-action ledger.

use crate::error::{StorageError, StorageResult};
use crate::record::{Collection, Index, IndexValue, Record};
use crate::schema;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use wayfare_model::{FailedAction, PendingAction};
use wayfare_types::{ActionId, HybridTimestamp};

/// Durable, schema-versioned storage backed by SQLite.
///
/// Every method is one SQLite transaction. Use [`LocalStore::transaction`]
/// when several writes must land together (an optimistic entity write and its
/// ledger entry). The store is synchronous; async callers should run it on a
/// blocking thread.
#[derive(Debug)]
pub struct LocalStore {
    conn: Mutex<Connection>,
    initialized: AtomicBool,
}

impl LocalStore {
    /// Opens (or creates) a store at the given path and initializes the schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("failed to open in-memory store: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            initialized: AtomicBool::new(false),
        };
        store.init()?;
        Ok(store)
    }

    /// Creates or upgrades the schema. Safe to call any number of times, from
    /// any number of threads; only the first call does work.
    pub fn init(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut conn = self.lock()?;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        schema::migrate(&mut conn)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Schema version stored in the database.
    pub fn schema_version(&self) -> StorageResult<u32> {
        schema::current_version(&*self.lock()?)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs `f` inside one SQLite transaction. Any error rolls back every
    /// write made through the [`StoreTx`].
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&StoreTx { conn: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    // ── Collections ──────────────────────────────────────────────

    /// Inserts or replaces a record by primary key.
    pub fn put<R: Record>(&self, record: &R) -> StorageResult<()> {
        put_record(&*self.lock()?, record)
    }

    pub fn get<R: Record>(&self, key: &str) -> StorageResult<Option<R>> {
        get_record(&*self.lock()?, key)
    }

    pub fn get_all<R: Record>(&self) -> StorageResult<Vec<R>> {
        let conn = self.lock()?;
        let sql = format!("SELECT data FROM {} ORDER BY key", R::COLLECTION.table());
        query_records(&conn, &sql, [])
    }

    pub fn get_all_by_index<R: Record>(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
    ) -> StorageResult<Vec<R>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT data FROM {} WHERE {} = ?1 ORDER BY key",
            R::COLLECTION.table(),
            index.column()
        );
        let value: IndexValue = value.into();
        query_records(&conn, &sql, [value])
    }

    /// Removes a record. Returns false if it was not there.
    pub fn remove<R: Record>(&self, key: &str) -> StorageResult<bool> {
        remove_record::<R>(&*self.lock()?, key)
    }

    /// Loads, modifies and stores a record. Returns false if it was not there.
    pub fn update<R: Record>(&self, key: &str, f: impl FnOnce(&mut R)) -> StorageResult<bool> {
        self.transaction(|tx| tx.update(key, f))
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: Collection) -> StorageResult<usize> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // ── Pending-action ledger ────────────────────────────────────

    pub fn append_action(&self, action: &PendingAction) -> StorageResult<()> {
        append_action(&*self.lock()?, action)
    }

    /// All pending actions, oldest first.
    pub fn pending_actions(&self) -> StorageResult<Vec<PendingAction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, action_type, payload, wall_time, logical, retries, entity_key
             FROM pending_actions ORDER BY wall_time, logical, seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingRow {
                id: row.get(0)?,
                action_type: row.get(1)?,
                payload: row.get(2)?,
                wall_time: row.get(3)?,
                logical: row.get(4)?,
                retries: row.get(5)?,
                entity_key: row.get(6)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_action()?);
        }
        Ok(result)
    }

    pub fn pending_action(&self, id: &ActionId) -> StorageResult<Option<PendingAction>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, action_type, payload, wall_time, logical, retries, entity_key
                 FROM pending_actions WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(PendingRow {
                        id: row.get(0)?,
                        action_type: row.get(1)?,
                        payload: row.get(2)?,
                        wall_time: row.get(3)?,
                        logical: row.get(4)?,
                        retries: row.get(5)?,
                        entity_key: row.get(6)?,
                    })
                },
            )
            .optional()?;
        row.map(PendingRow::into_action).transpose()
    }

    pub fn pending_count(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pending_actions", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Number of pending actions targeting one entity.
    pub fn pending_for_entity(&self, entity_key: &str) -> StorageResult<usize> {
        pending_for_entity(&*self.lock()?, entity_key)
    }

    /// Latest recorded ledger timestamp, if any.
    pub fn last_action_timestamp(&self) -> StorageResult<Option<HybridTimestamp>> {
        let conn = self.lock()?;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT wall_time, logical FROM pending_actions
                 ORDER BY wall_time DESC, logical DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(wall, logical)| HybridTimestamp::new(wall as u64, logical as u32)))
    }

    pub fn set_retries(&self, id: &ActionId, retries: u32) -> StorageResult<bool> {
        set_retries(&*self.lock()?, id, retries)
    }

    pub fn remove_action(&self, id: &ActionId) -> StorageResult<bool> {
        remove_action(&*self.lock()?, id)
    }

    /// Moves an action from the ledger to the failed-actions record.
    pub fn evict_action(&self, failed: &FailedAction) -> StorageResult<()> {
        self.transaction(|tx| tx.evict_action(failed))
    }

    // ── Failed actions ───────────────────────────────────────────

    /// Evicted actions, most recent first.
    pub fn failed_actions(&self) -> StorageResult<Vec<FailedAction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT action, reason, message, failed_at FROM failed_actions
             ORDER BY failed_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let action: String = row.get(0)?;
            let reason: String = row.get(1)?;
            let message: String = row.get(2)?;
            let failed_at: i64 = row.get(3)?;
            Ok((action, reason, message, failed_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (action, reason, message, failed_at) = row?;
            result.push(FailedAction {
                action: serde_json::from_str(&action)?,
                reason: reason
                    .parse()
                    .map_err(|e| StorageError::InvalidData(format!("{e}")))?,
                message,
                failed_at,
            });
        }
        Ok(result)
    }

    pub fn failed_count(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM failed_actions", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Forgets one failed action once the user has seen it.
    pub fn dismiss_failed(&self, id: &ActionId) -> StorageResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM failed_actions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(n > 0)
    }

    pub fn clear_failed(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM failed_actions", [])?)
    }
}

/// Handle to the store inside [`LocalStore::transaction`].
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

impl StoreTx<'_> {
    pub fn put<R: Record>(&self, record: &R) -> StorageResult<()> {
        put_record(self.conn, record)
    }

    pub fn get<R: Record>(&self, key: &str) -> StorageResult<Option<R>> {
        get_record(self.conn, key)
    }

    pub fn remove<R: Record>(&self, key: &str) -> StorageResult<bool> {
        remove_record::<R>(self.conn, key)
    }

    pub fn get_all_by_index<R: Record>(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
    ) -> StorageResult<Vec<R>> {
        let sql = format!(
            "SELECT data FROM {} WHERE {} = ?1 ORDER BY key",
            R::COLLECTION.table(),
            index.column()
        );
        let value: IndexValue = value.into();
        query_records(self.conn, &sql, [value])
    }

    pub fn update<R: Record>(&self, key: &str, f: impl FnOnce(&mut R)) -> StorageResult<bool> {
        match get_record::<R>(self.conn, key)? {
            Some(mut record) => {
                f(&mut record);
                put_record(self.conn, &record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn append_action(&self, action: &PendingAction) -> StorageResult<()> {
        append_action(self.conn, action)
    }

    pub fn remove_action(&self, id: &ActionId) -> StorageResult<bool> {
        remove_action(self.conn, id)
    }

    pub fn set_retries(&self, id: &ActionId, retries: u32) -> StorageResult<bool> {
        set_retries(self.conn, id, retries)
    }

    pub fn pending_for_entity(&self, entity_key: &str) -> StorageResult<usize> {
        pending_for_entity(self.conn, entity_key)
    }

    pub fn evict_action(&self, failed: &FailedAction) -> StorageResult<()> {
        let id = failed.action.id.to_string();
        self.conn.execute(
            "INSERT OR REPLACE INTO failed_actions (id, action, reason, message, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                serde_json::to_string(&failed.action)?,
                failed.reason.as_str(),
                failed.message,
                failed.failed_at,
            ],
        )?;
        if !remove_action(self.conn, &failed.action.id)? {
            warn!(action_id = %id, "evicted action was no longer in the ledger");
        }
        Ok(())
    }
}

// ── Shared statement helpers ─────────────────────────────────────

fn put_record<R: Record>(conn: &Connection, record: &R) -> StorageResult<()> {
    let collection = R::COLLECTION;
    let indexed = record.indexed();
    let data = serde_json::to_string(record)?;
    let sql = format!(
        "INSERT INTO {} (key, owner_id, parent_id, slug, synced, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(key) DO UPDATE SET
            owner_id = excluded.owner_id,
            parent_id = excluded.parent_id,
            slug = excluded.slug,
            synced = excluded.synced,
            data = excluded.data",
        collection.table()
    );
    conn.execute(
        &sql,
        params![
            record.key(),
            indexed.owner,
            indexed.parent,
            indexed.slug,
            indexed.synced,
            data,
        ],
    )
    .map_err(|e| unique_violation(collection, e))?;
    debug!(collection = collection.table(), key = %record.key(), "put record");
    Ok(())
}

fn get_record<R: Record>(conn: &Connection, key: &str) -> StorageResult<Option<R>> {
    let sql = format!("SELECT data FROM {} WHERE key = ?1", R::COLLECTION.table());
    let data: Option<String> = conn
        .query_row(&sql, params![key], |row| row.get(0))
        .optional()?;
    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn remove_record<R: Record>(conn: &Connection, key: &str) -> StorageResult<bool> {
    let sql = format!("DELETE FROM {} WHERE key = ?1", R::COLLECTION.table());
    Ok(conn.execute(&sql, params![key])? > 0)
}

fn query_records<R: Record, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<R>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(serde_json::from_str(&row?)?);
    }
    Ok(result)
}

fn append_action(conn: &Connection, action: &PendingAction) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO pending_actions
            (id, action_type, payload, wall_time, logical, retries, entity_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            action.id.to_string(),
            action.action_type,
            serde_json::to_string(&action.payload)?,
            action.timestamp.wall_time() as i64,
            action.timestamp.logical(),
            action.retries,
            action.entity_key,
        ],
    )?;
    debug!(action_id = %action.id, action_type = %action.action_type, "appended pending action");
    Ok(())
}

fn remove_action(conn: &Connection, id: &ActionId) -> StorageResult<bool> {
    let n = conn.execute(
        "DELETE FROM pending_actions WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(n > 0)
}

fn set_retries(conn: &Connection, id: &ActionId, retries: u32) -> StorageResult<bool> {
    let n = conn.execute(
        "UPDATE pending_actions SET retries = ?2 WHERE id = ?1",
        params![id.to_string(), retries],
    )?;
    Ok(n > 0)
}

fn pending_for_entity(conn: &Connection, entity_key: &str) -> StorageResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pending_actions WHERE entity_key = ?1",
        params![entity_key],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

fn unique_violation(collection: Collection, err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StorageError::UniqueViolation {
                collection: collection.table(),
                message: message.clone().unwrap_or_else(|| err.to_string()),
            }
        }
        _ => err.into(),
    }
}

struct PendingRow {
    id: String,
    action_type: String,
    payload: String,
    wall_time: i64,
    logical: i64,
    retries: i64,
    entity_key: String,
}

impl PendingRow {
    fn into_action(self) -> StorageResult<PendingAction> {
        let id = ActionId::parse(&self.id)
            .map_err(|e| StorageError::InvalidData(format!("invalid action id {}: {e}", self.id)))?;
        Ok(PendingAction {
            id,
            action_type: self.action_type,
            payload: serde_json::from_str(&self.payload)?,
            timestamp: HybridTimestamp::new(self.wall_time as u64, self.logical as u32),
            retries: self.retries as u32,
            entity_key: self.entity_key,
        })
    }
}
