//! Core library for Lockbox.
//!
//! Contains the vault record store, the cipher wire normalizer, the sync
//! assembler and the identity gate contract. This crate depends on
//! `lockbox-storage` for the storage backend trait and knows nothing about
//! HTTP or how credentials are issued.

pub mod clock;
pub mod domains;
pub mod error;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod service;
pub mod store;
pub mod sync;
pub mod view;

pub use error::{DecodeError, IdentityError, RecordKind, StoreError, VaultError};
pub use identity::{IdentityGate, Owner};
pub use service::{ImportSummary, VaultService};
pub use store::RecordStore;
pub use sync::{SyncOptions, SyncSnapshot};
