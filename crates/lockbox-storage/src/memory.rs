//! In-memory storage backend.
//!
//! Rows live in a `BTreeMap` behind a `RwLock`. Nothing is persisted; use it
//! for tests and throwaway development servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use crate::{Mutation, Replaced, StorageBackend, StorageError};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Conditional writes hold the write lock for the whole check-and-write, so
/// they are atomic with respect to every other operation. Keys are kept
/// sorted, which makes prefix scans a `BTreeMap::range`.
///
/// # Examples
///
/// ```
/// # use lockbox_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// assert!(backend.insert("folders/a/1", b"row").await.unwrap());
/// assert!(!backend.insert("folders/a/1", b"other").await.unwrap());
/// let val = backend.get("folders/a/1").await.unwrap();
/// assert_eq!(val, Some(b"row".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let mut data = self.data.write().await;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_owned(), value.to_vec());
        Ok(true)
    }

    async fn update(
        &self,
        key: &str,
        mutation: Mutation,
    ) -> Result<Option<Replaced>, StorageError> {
        let mut data = self.data.write().await;
        let Some(slot) = data.get_mut(key) else {
            return Ok(None);
        };
        let after = mutation(slot.as_slice())?;
        let before = std::mem::replace(slot, after.clone());
        Ok(Some(Replaced { before, after }))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let data = self.data.read().await;
        let rows = data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>();
        trace!(prefix, rows = rows.len(), "prefix scan");
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn append(suffix: &'static [u8]) -> Mutation {
        Box::new(move |old: &[u8]| {
            let mut next = old.to_vec();
            next.extend_from_slice(suffix);
            Ok(next)
        })
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("does/not/exist").await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_refuses_to_overwrite() {
        let backend = MemoryBackend::new();
        assert!(backend.insert("key", b"v1").await.unwrap());
        assert!(!backend.insert("key", b"v2").await.unwrap());
        assert_eq!(backend.get("key").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn update_missing_key_is_none_and_skips_mutation() {
        let backend = MemoryBackend::new();
        let mutation: Mutation = Box::new(|_: &[u8]| {
            Err(StorageError::Mutation {
                key: "missing".to_owned(),
                reason: "must not run".to_owned(),
            })
        });
        assert_eq!(backend.update("missing", mutation).await.unwrap(), None);
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_reports_before_and_after() {
        let backend = MemoryBackend::new();
        backend.insert("key", b"ab").await.unwrap();
        let replaced = backend.update("key", append(b"c")).await.unwrap().unwrap();
        assert_eq!(replaced.before, b"ab".to_vec());
        assert_eq!(replaced.after, b"abc".to_vec());
        assert_eq!(backend.get("key").await.unwrap(), Some(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_row_untouched() {
        let backend = MemoryBackend::new();
        backend.insert("key", b"keep").await.unwrap();
        let mutation: Mutation = Box::new(|_: &[u8]| {
            Err(StorageError::Mutation {
                key: "key".to_owned(),
                reason: "rejected".to_owned(),
            })
        });
        assert!(backend.update("key", mutation).await.is_err());
        assert_eq!(backend.get("key").await.unwrap(), Some(b"keep".to_vec()));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let backend = MemoryBackend::new();
        backend.insert("key", b"val").await.unwrap();
        assert!(backend.delete("key").await.unwrap());
        assert!(!backend.delete("key").await.unwrap());
        assert_eq!(backend.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_is_prefix_bounded_and_ordered() {
        let backend = MemoryBackend::new();
        backend.insert("ciphers/a/2", b"2").await.unwrap();
        backend.insert("ciphers/a/1", b"1").await.unwrap();
        backend.insert("ciphers/ab/1", b"x").await.unwrap();
        backend.insert("folders/a/1", b"f").await.unwrap();

        let rows = backend.scan("ciphers/a/").await.unwrap();
        assert_eq!(
            rows,
            vec![
                ("ciphers/a/1".to_owned(), b"1".to_vec()),
                ("ciphers/a/2".to_owned(), b"2".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn scan_no_matches_returns_empty() {
        let backend = MemoryBackend::new();
        backend.insert("meta/schema", b"1").await.unwrap();
        assert!(backend.scan("ciphers/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.insert("key", b"val").await.unwrap();
        assert_eq!(clone.get("key").await.unwrap(), Some(b"val".to_vec()));
    }
}
