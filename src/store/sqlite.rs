use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{DocumentStore, StoreError};
use crate::models::{FieldValue, RawRecord};

/// Local SQLite-backed document store (development and offline use).
///
/// Reads run on the blocking pool so a slow query never stalls the runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite store at the given path and run migrations
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace a document. Used for seeding; the pipeline never writes.
    pub fn put_document(&self, collection: &str, record: &RawRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(&record.fields).map_err(|e| StoreError::Decode(e.to_string()))?;
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
            params![collection, record.id, body],
        )?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))
}

fn list_blocking(conn: &Mutex<Connection>, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, body) = row?;
        records.push(decode_row(id, &body)?);
    }
    Ok(records)
}

fn get_blocking(conn: &Mutex<Connection>, collection: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
    let conn = lock(conn)?;
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| decode_row(id.to_string(), &b)).transpose()
}

impl DocumentStore for SqliteStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let name = collection.to_string();
        let records = tokio::task::spawn_blocking(move || list_blocking(&conn, &name))
            .await
            .map_err(|e| StoreError::Unavailable(format!("sqlite task failed: {e}")))??;
        tracing::debug!(collection, count = records.len(), "Listed sqlite documents");
        Ok(records)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let (name, id) = (collection.to_string(), id.to_string());
        tokio::task::spawn_blocking(move || get_blocking(&conn, &name, &id))
            .await
            .map_err(|e| StoreError::Unavailable(format!("sqlite task failed: {e}")))?
    }
}

fn decode_row(id: String, body: &str) -> Result<RawRecord, StoreError> {
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(body)
        .map_err(|e| StoreError::Decode(format!("document {id}: {e}")))?;
    Ok(RawRecord { id, fields })
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_documents.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| StoreError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}
