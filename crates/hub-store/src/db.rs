use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub type StoreResult<T> = Result<T, StoreError>;

/// The embedded relational store: one SQLite connection, single-writer.
///
/// Every mutation goes through a method on `Store` that opens an `IMMEDIATE`
/// transaction, mutates rows, appends one or more events, and commits — the
/// unit of atomicity §4.3 requires. Callers that need concurrent access
/// (the hub process) wrap a `Store` in `Arc<tokio::sync::Mutex<Store>>`,
/// mirroring the teacher's `Arc<Mutex<Db>>` around its own embedded
/// connection.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        store.ensure_meta()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.apply_schema()?;
        store.ensure_meta()?;
        Ok(store)
    }

    pub fn integrity_check(&self) -> StoreResult<()> {
        let result: String = self
            .conn
            .pragma_query_value(None, "integrity_check", |row| row.get(0))?;
        if result != "ok" {
            return Err(StoreError::IntegrityCheckFailed(result));
        }
        Ok(())
    }

    pub fn db_id(&self) -> StoreResult<String> {
        Ok(self
            .conn
            .query_row("SELECT db_id FROM meta LIMIT 1", [], |row| row.get(0))?)
    }

    pub fn schema_version(&self) -> StoreResult<i64> {
        Ok(self.conn.query_row(
            "SELECT schema_version FROM meta LIMIT 1",
            [],
            |row| row.get(0),
        )?)
    }

    fn apply_pragmas(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=FULL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn ensure_meta(&self) -> StoreResult<()> {
        let exists: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM meta", [], |row| row.get(0))?;
        if exists == 0 {
            self.conn.execute(
                "INSERT INTO meta (db_id, schema_version, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    hub_protocol::SCHEMA_VERSION,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }
}
