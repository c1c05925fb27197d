//! Document store adapters.
//!
//! The pipeline only reads. A collection that does not exist lists as empty;
//! a document that does not exist is `Ok(None)`. Everything else that goes
//! wrong talking to the backend is a `StoreError`.

pub mod firestore;
pub mod memory;
pub mod sqlite;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::future::Future;

use thiserror::Error;

use crate::config::StoreSettings;
use crate::models::RawRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Could not decode stored document: {0}")]
    Decode(String),

    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
}

/// Read-only access to named collections of schemaless documents.
pub trait DocumentStore: Send + Sync {
    /// Every document of `collection`, in store order.
    fn list_documents(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<RawRecord>, StoreError>> + Send;

    /// A single document by id.
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<RawRecord>, StoreError>> + Send;
}

/// Backend picked from runtime settings.
pub enum ConfiguredStore {
    Sqlite(SqliteStore),
    Firestore(FirestoreStore),
}

impl ConfiguredStore {
    pub fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        match settings {
            StoreSettings::Sqlite { path } => {
                tracing::info!(path = %path.display(), "Opening SQLite document store");
                Ok(ConfiguredStore::Sqlite(SqliteStore::open(path)?))
            }
            StoreSettings::Firestore(config) => {
                tracing::info!(project = %config.project_id, "Using Firestore document store");
                Ok(ConfiguredStore::Firestore(FirestoreStore::new(config.clone())?))
            }
        }
    }
}

impl DocumentStore for ConfiguredStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
        match self {
            ConfiguredStore::Sqlite(s) => s.list_documents(collection).await,
            ConfiguredStore::Firestore(s) => s.list_documents(collection).await,
        }
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        match self {
            ConfiguredStore::Sqlite(s) => s.get_document(collection, id).await,
            ConfiguredStore::Firestore(s) => s.get_document(collection, id).await,
        }
    }
}
