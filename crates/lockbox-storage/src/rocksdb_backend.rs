//! `RocksDB` storage backend.
//!
//! Wraps the `rocksdb` crate behind the [`StorageBackend`] trait. All
//! operations are dispatched to a blocking thread via
//! [`tokio::task::spawn_blocking`] since `RocksDB` is a synchronous C++ library.
//!
//! `RocksDB` has no native compare-and-set, so every write takes the
//! backend's write lock for the whole check-and-write. Reads stay lock-free.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rocksdb::{DBWithThreadMode, MultiThreaded, Options};
use tracing::debug;

use crate::{Mutation, Replaced, StorageBackend, StorageError};

type Db = DBWithThreadMode<MultiThreaded>;

/// A storage backend backed by `RocksDB`.
///
/// # Examples
///
/// ```no_run
/// # use lockbox_storage::RocksDbBackend;
/// let backend = RocksDbBackend::open("/var/lib/lockbox/rocksdb").unwrap();
/// ```
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    write_lock: Arc<Mutex<()>>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn panicked(e: &tokio::task::JoinError) -> StorageError {
    StorageError::Transaction {
        reason: format!("blocking task panicked: {e}"),
    }
}

fn poisoned() -> StorageError {
    StorageError::Transaction {
        reason: "write lock poisoned".to_owned(),
    }
}

impl RocksDbBackend {
    /// Open a `RocksDB` database at the given path, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if `RocksDB` fails to open or create the
    /// database at the specified path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), "opened RocksDB database");
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            path: path.to_path_buf(),
        })
    }
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            db.get(key.as_bytes()).map_err(|e| StorageError::Read {
                key,
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.write_lock);
        let key = key.to_owned();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| poisoned())?;
            let write_err = |e: rocksdb::Error| StorageError::Write {
                key: key.clone(),
                reason: e.to_string(),
            };
            if db.get(key.as_bytes()).map_err(write_err)?.is_some() {
                return Ok(false);
            }
            db.put(key.as_bytes(), &value).map_err(write_err)?;
            Ok(true)
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn update(
        &self,
        key: &str,
        mutation: Mutation,
    ) -> Result<Option<Replaced>, StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.write_lock);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| poisoned())?;
            let write_err = |e: rocksdb::Error| StorageError::Write {
                key: key.clone(),
                reason: e.to_string(),
            };
            let Some(before) = db.get(key.as_bytes()).map_err(write_err)? else {
                return Ok(None);
            };
            let after = mutation(before.as_slice())?;
            db.put(key.as_bytes(), &after).map_err(write_err)?;
            Ok(Some(Replaced { before, after }))
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let lock = Arc::clone(&self.write_lock);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| poisoned())?;
            let delete_err = |e: rocksdb::Error| StorageError::Delete {
                key: key.clone(),
                reason: e.to_string(),
            };
            if db.get(key.as_bytes()).map_err(delete_err)?.is_none() {
                return Ok(false);
            }
            db.delete(key.as_bytes()).map_err(delete_err)?;
            Ok(true)
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let iter = db.iterator(rocksdb::IteratorMode::From(
                prefix.as_bytes(),
                rocksdb::Direction::Forward,
            ));

            let mut rows = Vec::new();
            for item in iter {
                let (k, v) = item.map_err(|e| StorageError::List {
                    prefix: prefix.clone(),
                    reason: e.to_string(),
                })?;
                let key = String::from_utf8(k.to_vec()).map_err(|e| StorageError::InvalidKey {
                    reason: e.to_string(),
                })?;
                if !key.starts_with(&prefix) {
                    break;
                }
                rows.push((key, v.to_vec()));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| panicked(&e))?
    }
}
