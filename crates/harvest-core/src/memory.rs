use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::AppError;
use crate::models::{CollectionTarget, Payload};
use crate::traits::RecordSink;

type Collections = BTreeMap<(String, String), Vec<serde_json::Value>>;

/// In-process sink keeping every collection in memory. Used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    collections: Arc<Mutex<Collections>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn documents(&self, target: &CollectionTarget) -> Vec<serde_json::Value> {
        self.lock()
            .get(&key(target))
            .cloned()
            .unwrap_or_default()
    }

    /// `(target, document count)` for every non-empty collection, sorted.
    pub fn summary(&self) -> Vec<(CollectionTarget, usize)> {
        self.lock()
            .iter()
            .map(|((store, collection), docs)| {
                (CollectionTarget::new(store.as_str(), collection.as_str()), docs.len())
            })
            .collect()
    }
}

fn key(target: &CollectionTarget) -> (String, String) {
    (target.store.clone(), target.collection.clone())
}

impl RecordSink for MemorySink {
    async fn insert(&self, target: &CollectionTarget, payload: Payload) -> Result<u64, AppError> {
        if payload.is_null() {
            return Err(AppError::PersistenceError(format!(
                "Cannot insert a null document into {target}"
            )));
        }
        let documents = payload.into_documents();
        let count = documents.len() as u64;
        if count > 0 {
            self.lock().entry(key(target)).or_default().extend(documents);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn appends_without_dedup() {
        let sink = MemorySink::new();
        let target = CollectionTarget::new("Hockey_Teams_Data", "teams");

        let first = sink
            .insert(&target, Payload::Many(vec![json!({"name": "A"}), json!({"name": "B"})]))
            .await
            .unwrap();
        let second = sink.insert(&target, Payload::One(json!({"name": "A"}))).await.unwrap();

        assert_eq!((first, second), (2, 1));
        assert_eq!(sink.documents(&target).len(), 3);
        assert_eq!(sink.summary(), vec![(target, 3)]);
    }

    #[tokio::test]
    async fn null_payload_is_rejected() {
        let sink = MemorySink::new();
        let target = CollectionTarget::new("Oscar_Winning_Films", "2015");
        let err = sink.insert(&target, Payload::Null).await.unwrap_err();
        assert!(matches!(err, AppError::PersistenceError(_)));
        assert!(sink.summary().is_empty());
    }

    #[tokio::test]
    async fn empty_list_is_a_no_op() {
        let sink = MemorySink::new();
        let target = CollectionTarget::new("Advanced_topics", "Topics");
        assert_eq!(sink.insert(&target, Payload::Many(Vec::new())).await.unwrap(), 0);
        assert!(sink.summary().is_empty());
    }
}
