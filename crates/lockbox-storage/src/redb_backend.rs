//! Pure-Rust redb storage backend.
//!
//! The default persistent engine: no C++ toolchain needed. Feature-gated
//! behind `redb-backend`.
//!
//! Every conditional write runs inside one redb write transaction, and redb
//! admits a single writer at a time, so check-and-write is atomic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::{Mutation, Replaced, StorageBackend, StorageError};

/// The single table holding every row. Relations are namespaced by key prefix.
const ROWS: TableDefinition<&str, &[u8]> = TableDefinition::new("rows");

/// A storage backend backed by redb.
///
/// Thread-safe via `Arc<Database>`. Blocking redb calls are offloaded to the
/// Tokio blocking thread pool.
///
/// # Examples
///
/// ```no_run
/// # use lockbox_storage::RedbBackend;
/// let backend = RedbBackend::open("/var/lib/lockbox/vault.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn panicked(e: &tokio::task::JoinError) -> StorageError {
    StorageError::Transaction {
        reason: format!("blocking task panicked: {e}"),
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// database file, or [`StorageError::Transaction`] if the row table
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Opening the table in a write transaction creates it if missing.
        let txn = db.begin_write().map_err(txn_err)?;
        {
            let _table = txn.open_table(ROWS).map_err(txn_err)?;
        }
        txn.commit().map_err(txn_err)?;

        debug!(path = %path.display(), "opened redb database");
        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(ROWS).map_err(txn_err)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            let inserted = {
                let mut table = txn.open_table(ROWS).map_err(txn_err)?;
                let write_err = |e: redb::StorageError| StorageError::Write {
                    key: key.clone(),
                    reason: e.to_string(),
                };
                let present = table.get(key.as_str()).map_err(write_err)?.is_some();
                if !present {
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(write_err)?;
                }
                !present
            };
            if inserted {
                txn.commit().map_err(txn_err)?;
            } else {
                txn.abort().map_err(txn_err)?;
            }
            Ok(inserted)
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
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            let replaced = {
                let mut table = txn.open_table(ROWS).map_err(txn_err)?;
                let write_err = |e: redb::StorageError| StorageError::Write {
                    key: key.clone(),
                    reason: e.to_string(),
                };
                let before = table
                    .get(key.as_str())
                    .map_err(write_err)?
                    .map(|v| v.value().to_vec());
                match before {
                    None => None,
                    Some(before) => {
                        let after = mutation(before.as_slice())?;
                        table
                            .insert(key.as_str(), after.as_slice())
                            .map_err(write_err)?;
                        Some(Replaced { before, after })
                    }
                }
            };
            if replaced.is_some() {
                txn.commit().map_err(txn_err)?;
            } else {
                txn.abort().map_err(txn_err)?;
            }
            Ok(replaced)
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            let existed = {
                let mut table = txn.open_table(ROWS).map_err(txn_err)?;
                let removed = table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?
                    .is_some();
                removed
            };
            txn.commit().map_err(txn_err)?;
            Ok(existed)
        })
        .await
        .map_err(|e| panicked(&e))?
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let list_err = |e: redb::StorageError| StorageError::List {
                prefix: prefix.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(ROWS).map_err(txn_err)?;

            let mut rows = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(list_err)? {
                let (k, v) = item.map_err(list_err)?;
                let key = k.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                rows.push((key.to_owned(), v.value().to_vec()));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| panicked(&e))?
    }
}
