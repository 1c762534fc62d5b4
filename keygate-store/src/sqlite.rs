//! SQLite-backed key store.
//!
//! One connection behind a mutex is the writer-serialization boundary: binds
//! targeting the same key are applied one at a time, each seeing the effect
//! of the previous. Every mutation commits as a single transaction, so a
//! failure never leaves a partial write behind.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{BindOutcome, CreateOutcome, DeleteOutcome, KeyRecord};
use crate::snapshot::Snapshot;
use crate::KeyStore;

/// Sentinel for the unscoped pool. SQL treats NULLs as pairwise distinct,
/// which would defeat the (scope, key_id) uniqueness constraint.
const UNSCOPED: &str = "";

/// Persistent key store backed by SQLite.
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Opens (or creates) a key store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Storage(format!("failed to open key store: {e}")))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory key store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("failed to open in-memory key store: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license_keys (
                scope TEXT NOT NULL,
                key_id TEXT NOT NULL,
                bound INTEGER NOT NULL DEFAULT 0,
                device_id TEXT,
                last_verified TEXT,
                UNIQUE(scope, key_id)
            );
            ",
        )
        .map_err(|e| StoreError::Storage(format!("failed to init key schema: {e}")))?;
        Ok(())
    }
}

fn scope_param(scope: Option<&str>) -> &str {
    scope.unwrap_or(UNSCOPED)
}

fn scope_column(raw: String) -> Option<String> {
    if raw.is_empty() { None } else { Some(raw) }
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("invalid timestamp in store: {e}")))
}

impl KeyStore for SqliteKeyStore {
    fn get(&self, scope: Option<&str>, key_id: &str) -> StoreResult<Option<KeyRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT bound, device_id, last_verified FROM license_keys WHERE scope = ?1 AND key_id = ?2",
            params![scope_param(scope), key_id],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        );
        match result {
            Ok((bound, device_id, ts)) => Ok(Some(KeyRecord {
                scope: scope.map(str::to_string),
                key_id: key_id.to_string(),
                bound,
                device_id,
                last_verified: ts.as_deref().map(parse_ts).transpose()?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Storage(format!("failed to read key: {e}"))),
        }
    }

    fn create(&self, scope: Option<&str>, key_id: &str) -> StoreResult<CreateOutcome> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO license_keys (scope, key_id, bound) VALUES (?1, ?2, 0)",
                params![scope_param(scope), key_id],
            )
            .map_err(|e| StoreError::Storage(format!("failed to create key: {e}")))?;
        Ok(if inserted == 0 {
            CreateOutcome::AlreadyExists
        } else {
            CreateOutcome::Created
        })
    }

    fn delete(&self, scope: Option<&str>, key_id: &str) -> StoreResult<DeleteOutcome> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM license_keys WHERE scope = ?1 AND key_id = ?2",
                params![scope_param(scope), key_id],
            )
            .map_err(|e| StoreError::Storage(format!("failed to delete key: {e}")))?;
        Ok(if removed == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }

    fn compare_and_bind(
        &self,
        scope: Option<&str>,
        key_id: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BindOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::Storage(format!("failed to start bind transaction: {e}")))?;

        let current = tx.query_row(
            "SELECT bound, device_id, last_verified FROM license_keys WHERE scope = ?1 AND key_id = ?2",
            params![scope_param(scope), key_id],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        );
        let (bound, owner, last_verified) = match current {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(BindOutcome::Missing),
            Err(e) => {
                return Err(StoreError::Storage(format!("failed to read key for bind: {e}")));
            }
        };

        if bound && owner.as_deref() != Some(device_id) {
            // Exclusivity: the record stays exactly as it is.
            return Ok(BindOutcome::Conflict(KeyRecord {
                scope: scope.map(str::to_string),
                key_id: key_id.to_string(),
                bound: true,
                device_id: owner,
                last_verified: last_verified.as_deref().map(parse_ts).transpose()?,
            }));
        }

        tx.execute(
            "UPDATE license_keys SET bound = 1, device_id = ?3, last_verified = ?4
             WHERE scope = ?1 AND key_id = ?2",
            params![scope_param(scope), key_id, device_id, now.to_rfc3339()],
        )
        .map_err(|e| StoreError::Storage(format!("failed to write binding: {e}")))?;

        // Commit is the last step: once the caller sees success the binding
        // is on disk.
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("failed to commit binding: {e}")))?;

        let record = KeyRecord {
            scope: scope.map(str::to_string),
            key_id: key_id.to_string(),
            bound: true,
            device_id: Some(device_id.to_string()),
            last_verified: Some(now),
        };
        Ok(if bound {
            BindOutcome::Reverified(record)
        } else {
            BindOutcome::Bound(record)
        })
    }

    fn list_used(&self) -> StoreResult<Vec<KeyRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT scope, key_id, device_id, last_verified FROM license_keys
                 WHERE bound = 1 ORDER BY scope, key_id",
            )
            .map_err(|e| StoreError::Storage(format!("failed to prepare used-key query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| StoreError::Storage(format!("failed to query used keys: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (scope_raw, key_id, device_id, ts) =
                row.map_err(|e| StoreError::Storage(format!("failed to read used-key row: {e}")))?;
            result.push(KeyRecord {
                scope: scope_column(scope_raw),
                key_id,
                bound: true,
                device_id,
                last_verified: ts.as_deref().map(parse_ts).transpose()?,
            });
        }
        Ok(result)
    }

    fn export(&self) -> StoreResult<Snapshot> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT scope, key_id, bound, device_id, last_verified FROM license_keys")
            .map_err(|e| StoreError::Storage(format!("failed to prepare export query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(|e| StoreError::Storage(format!("failed to query export rows: {e}")))?;

        let mut snapshot = Snapshot::default();
        for row in rows {
            let (scope_raw, key_id, bound, device_id, ts) =
                row.map_err(|e| StoreError::Storage(format!("failed to read export row: {e}")))?;
            snapshot.insert(KeyRecord {
                scope: scope_column(scope_raw),
                key_id,
                bound,
                device_id,
                last_verified: ts.as_deref().map(parse_ts).transpose()?,
            });
        }
        Ok(snapshot)
    }

    fn import(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StoreError::Storage(format!("failed to start import transaction: {e}")))?;

        tx.execute("DELETE FROM license_keys", [])
            .map_err(|e| StoreError::Storage(format!("failed to clear store for import: {e}")))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO license_keys (scope, key_id, bound, device_id, last_verified)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| StoreError::Storage(format!("failed to prepare import insert: {e}")))?;
            for record in snapshot.records() {
                stmt.execute(params![
                    scope_param(record.scope.as_deref()),
                    record.key_id,
                    record.bound,
                    record.device_id,
                    record.last_verified.map(|t| t.to_rfc3339()),
                ])
                .map_err(|e| StoreError::Storage(format!("failed to import key: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("failed to commit import: {e}")))?;

        debug!(keys = snapshot.len(), "store replaced from snapshot");
        Ok(())
    }
}
