//! Per-document write serialization

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of async mutexes keyed by document ID.
///
/// Entries exist only while someone holds or waits for the lock.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive write access to one document
pub struct DocumentGuard {
    document_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `document_id`
    pub async fn acquire(&self, document_id: &str) -> DocumentGuard {
        let mutex = self
            .locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        DocumentGuard {
            document_id: document_id.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of documents with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no lock entry exists
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        // Release first so the table holds the only other reference
        self.guard.take();
        self.locks
            .remove_if(&self.document_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_document_is_serialized() {
        let locks = Arc::new(DocumentLocks::new());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = locks.acquire("doc1").await;

        let task = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.acquire("doc1").await;
                order.lock().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().push("first");
        drop(first);
        task.await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_documents_do_not_block() {
        let locks = DocumentLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
