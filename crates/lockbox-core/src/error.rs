//! Error types for `lockbox-core`.
//!
//! A miss and an owner mismatch both surface as [`StoreError::NotFound`]
//! carrying only the record kind, so nothing in an error reveals whether a
//! record exists under another account. Identity errors never echo the
//! credential.

use std::fmt;

use lockbox_storage::StorageError;

/// The kind of record an operation was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Account,
    Cipher,
    Folder,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Account => "account",
            Self::Cipher => "cipher",
            Self::Folder => "folder",
        })
    }
}

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record matched both the owner and the id.
    #[error("{kind} not found")]
    NotFound { kind: RecordKind },

    /// A value that must be globally unique is already taken.
    #[error("{field} is already in use")]
    UniquenessViolation { field: &'static str },

    /// The stored record changed after the revision the client last saw.
    #[error("{kind} was modified by another client")]
    StaleRevision { kind: RecordKind },

    /// A stored row could not be decoded or encoded.
    #[error("corrupt row at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The schema marker does not match this build.
    #[error("schema version mismatch: found '{found}', expected '{expected}'")]
    SchemaMismatch { found: String, expected: &'static str },

    /// The underlying storage backend returned an error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub(crate) fn not_found(kind: RecordKind) -> Self {
        Self::NotFound { kind }
    }
}

/// Errors from decoding an inbound submission.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The body is not well-formed JSON of the expected shape.
    #[error("malformed {what}: {source}")]
    Malformed {
        what: &'static str,
        source: serde_json::Error,
    },

    /// The body parsed but refers to something that cannot exist.
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
}

/// Errors from resolving a caller credential to an owner.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No credential was presented.
    #[error("missing credential")]
    MissingCredential,

    /// The credential failed verification.
    #[error("invalid credential: {reason}")]
    InvalidCredential { reason: String },

    /// The credential was valid once but has expired.
    #[error("credential expired")]
    Expired,

    /// The credential is valid but names no provisioned account.
    #[error("no account for this credential")]
    UnknownAccount,
}

/// Top-level error for vault service operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A record store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The submission could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The caller could not be identified.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}
