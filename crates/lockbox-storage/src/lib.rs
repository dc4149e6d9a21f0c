//! Storage backend abstraction for Lockbox.
//!
//! This crate defines the [`StorageBackend`] trait, a key-value row store
//! that knows nothing about accounts, ciphers, or folders. The record store
//! in `lockbox-core` lays its relations out as keys and relies on the
//! conditional writes here to express "owner AND id" predicates as a single
//! engine operation.
//!
//! Three implementations are provided:
//!
//! - [`MemoryBackend`]: in-memory, for tests and development
//! - [`RedbBackend`]: pure-Rust persistent engine (feature `redb-backend`)
//! - [`RocksDbBackend`]: `RocksDB` persistent engine (feature `rocksdb-backend`)

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// A read-modify-write step applied to an existing row.
///
/// Receives the current value and returns the replacement. Returning an
/// error aborts the update and leaves the row untouched.
pub type Mutation = Box<dyn FnOnce(&[u8]) -> Result<Vec<u8>, StorageError> + Send>;

/// The row before and after a successful [`StorageBackend::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
    /// Value stored before the mutation ran.
    pub before: Vec<u8>,
    /// Value stored by the mutation.
    pub after: Vec<u8>,
}

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `ciphers/<owner>/<id>`).
/// Values are opaque byte arrays.
///
/// Every write is a single engine operation: `insert`, `update` and `delete`
/// check for the row and act on it atomically, so callers never need a
/// separate existence check before writing.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value only if the key is absent.
    ///
    /// Returns `Ok(false)` without writing when the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError>;

    /// Apply `mutation` to the value at `key` only if the key exists.
    ///
    /// Returns `Ok(None)` without calling `mutation` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails, or
    /// whatever error `mutation` produced.
    async fn update(&self, key: &str, mutation: Mutation)
    -> Result<Option<Replaced>, StorageError>;

    /// Delete a key, reporting whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Return every `(key, value)` pair whose key starts with `prefix`,
    /// ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}
