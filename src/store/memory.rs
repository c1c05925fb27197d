use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::{DocumentStore, StoreError};
use crate::models::{FieldValue, RawRecord};

/// In-process store. Cloning shares the same collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<BTreeMap<String, Vec<RawRecord>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, replacing any existing document with the same id.
    pub fn insert(&self, collection: &str, record: RawRecord) -> Result<(), StoreError> {
        let mut guard = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        upsert(guard.entry(collection.to_string()).or_default(), record);
        Ok(())
    }

    /// Add a document under a freshly generated id and return that id.
    pub fn insert_new(
        &self,
        collection: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.insert(collection, RawRecord { id: id.clone(), fields })?;
        Ok(id)
    }

    /// Builder for seeding. Every record lands even if an earlier writer
    /// panicked, since each insert replaces whole documents.
    pub fn with_documents(self, collection: &str, records: Vec<RawRecord>) -> Self {
        {
            let mut guard = self
                .collections
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let docs = guard.entry(collection.to_string()).or_default();
            for record in records {
                upsert(docs, record);
            }
        }
        self
    }
}

fn upsert(docs: &mut Vec<RawRecord>, record: RawRecord) {
    match docs.iter().position(|d| d.id == record.id) {
        Some(idx) => docs[idx] = record,
        None => docs.push(record),
    }
}

impl DocumentStore for MemoryStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        let guard = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }
}
