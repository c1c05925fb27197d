//! Fetch stage.

use crate::models::RawRecord;
use crate::store::{DocumentStore, StoreError};

/// All documents of `collection`. A collection that does not exist is empty.
pub async fn fetch_collection<S: DocumentStore>(
    store: &S,
    collection: &str,
) -> Result<Vec<RawRecord>, StoreError> {
    let records = store.list_documents(collection).await.map_err(|e| {
        tracing::error!(collection, error = %e, "Fetch failed");
        e
    })?;
    tracing::debug!(collection, count = records.len(), "Fetched collection");
    Ok(records)
}

/// One document by id, `None` when it does not exist.
pub async fn fetch_document<S: DocumentStore>(
    store: &S,
    collection: &str,
    id: &str,
) -> Result<Option<RawRecord>, StoreError> {
    let record = store.get_document(collection, id).await.map_err(|e| {
        tracing::error!(collection, error = %e, "Document fetch failed");
        e
    })?;
    if record.is_none() {
        tracing::debug!(collection, "Document not found");
    }
    Ok(record)
}

/// Fetch two collections concurrently. Fails if either fetch fails.
pub async fn fetch_pair<S: DocumentStore>(
    store: &S,
    first: &str,
    second: &str,
) -> Result<(Vec<RawRecord>, Vec<RawRecord>), StoreError> {
    tokio::try_join!(fetch_collection(store, first), fetch_collection(store, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Store whose backend is always down.
    struct DownStore;

    impl DocumentStore for DownStore {
        async fn list_documents(&self, _collection: &str) -> Result<Vec<RawRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn get_document(&self, _collection: &str, _id: &str) -> Result<Option<RawRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn seeded() -> MemoryStore {
        MemoryStore::new()
            .with_documents("Appointments", vec![RawRecord::new("ap-1"), RawRecord::new("ap-2")])
            .with_documents("prescriptions", vec![RawRecord::new("rx-1")])
    }

    #[tokio::test]
    async fn missing_collection_is_empty_not_error() {
        let records = fetch_collection(&seeded(), "nothing-here").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_error() {
        let err = fetch_collection(&DownStore, "Appointments").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(fetch_document(&DownStore, "Prescriptions", "rx-1").await.is_err());
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        assert!(fetch_document(&seeded(), "prescriptions", "rx-404").await.unwrap().is_none());
        assert!(fetch_document(&seeded(), "prescriptions", "rx-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pair_returns_both_in_argument_order() {
        let (appointments, prescriptions) =
            fetch_pair(&seeded(), "Appointments", "prescriptions").await.unwrap();
        assert_eq!(appointments.len(), 2);
        assert_eq!(prescriptions.len(), 1);
    }

    #[tokio::test]
    async fn pair_fails_if_either_side_fails() {
        assert!(fetch_pair(&DownStore, "Appointments", "prescriptions").await.is_err());
    }
}
