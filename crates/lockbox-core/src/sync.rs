//! Sync assembler: the full-vault snapshot a client refreshes from.
//!
//! Read-only and uncached. Every call reflects the latest committed rows, and
//! any failed sub-fetch fails the whole snapshot. Rows come back ordered by
//! id, so two calls with no write in between serialize identically.

use serde::Serialize;

use crate::domains::{Domains, global_domains};
use crate::error::StoreError;
use crate::identity::Owner;
use crate::store::RecordStore;
use crate::view::{CipherView, FolderView, Profile};

/// Knobs a client can set on a sync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Leave the domain table out of the snapshot.
    pub exclude_domains: bool,
}

/// Everything a client needs to rebuild its local vault.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub profile: Profile,
    pub folders: Vec<FolderView>,
    pub collections: Vec<serde_json::Value>,
    pub policies: Vec<serde_json::Value>,
    pub ciphers: Vec<CipherView>,
    pub domains: Option<Domains>,
    pub sends: Vec<serde_json::Value>,
    pub object: &'static str,
}

/// Assemble a snapshot of the owner's vault.
///
/// # Errors
///
/// Propagates any [`StoreError`] from the account, folder or cipher reads.
/// Nothing is substituted for a failed read.
pub async fn assemble(
    store: &RecordStore,
    owner: &Owner,
    options: SyncOptions,
) -> Result<SyncSnapshot, StoreError> {
    let account = store.account(owner).await?;
    let folders = store.get_folders(owner).await?;
    let ciphers = store.get_ciphers(owner).await?;

    Ok(SyncSnapshot {
        profile: Profile::from(account),
        folders: folders.into_iter().map(FolderView::from).collect(),
        collections: Vec::new(),
        policies: Vec::new(),
        ciphers: ciphers.into_iter().map(CipherView::details).collect(),
        domains: (!options.exclude_domains).then(global_domains),
        sends: Vec::new(),
        object: "sync",
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use lockbox_storage::{MemoryBackend, StorageBackend, StorageError};

    use super::*;
    use crate::model::CipherDraft;
    use crate::store::tests::new_account;

    async fn seeded() -> (RecordStore, Owner) {
        let store = RecordStore::open(Arc::new(MemoryBackend::new())).await.unwrap();
        let account = store.add_account(new_account("a@example.com")).await.unwrap();
        let owner = Owner::new(account.id);
        store.add_folder("Work".to_owned(), &owner).await.unwrap();
        for _ in 0..3 {
            store.new_cipher(CipherDraft::default(), &owner).await.unwrap();
        }
        (store, owner)
    }

    #[tokio::test]
    async fn snapshot_contains_everything() {
        let (store, owner) = seeded().await;
        let snapshot = assemble(&store, &owner, SyncOptions::default()).await.unwrap();
        assert_eq!(snapshot.profile.id, owner.id());
        assert_eq!(snapshot.profile.security_stamp, owner.id());
        assert_eq!(snapshot.folders.len(), 1);
        assert_eq!(snapshot.ciphers.len(), 3);
        assert!(snapshot.ciphers.iter().all(|c| c.object == "cipherDetails"));
        assert!(snapshot.domains.is_some());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["object"], "sync");
        assert_eq!(json["collections"], serde_json::json!([]));
        assert_eq!(json["policies"], serde_json::json!([]));
        assert_eq!(json["sends"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn repeated_sync_is_byte_identical() {
        let (store, owner) = seeded().await;
        let first = serde_json::to_vec(&assemble(&store, &owner, SyncOptions::default()).await.unwrap())
            .unwrap();
        let second = serde_json::to_vec(&assemble(&store, &owner, SyncOptions::default()).await.unwrap())
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sync_reflects_latest_writes() {
        let (store, owner) = seeded().await;
        let before = assemble(&store, &owner, SyncOptions::default()).await.unwrap();
        store.add_folder("Personal".to_owned(), &owner).await.unwrap();
        let after = assemble(&store, &owner, SyncOptions::default()).await.unwrap();
        assert_eq!(after.folders.len(), before.folders.len() + 1);
    }

    #[tokio::test]
    async fn exclude_domains_drops_the_table() {
        let (store, owner) = seeded().await;
        let options = SyncOptions {
            exclude_domains: true,
        };
        let snapshot = assemble(&store, &owner, options).await.unwrap();
        assert!(snapshot.domains.is_none());
        assert!(serde_json::to_value(&snapshot).unwrap()["domains"].is_null());
    }

    /// Serves reads from a real store but fails every scan.
    struct FailingScans(MemoryBackend);

    #[async_trait::async_trait]
    impl StorageBackend for FailingScans {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.get(key).await
        }
        async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
            self.0.insert(key, value).await
        }
        async fn update(
            &self,
            key: &str,
            mutation: lockbox_storage::Mutation,
        ) -> Result<Option<lockbox_storage::Replaced>, StorageError> {
            self.0.update(key, mutation).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            self.0.delete(key).await
        }
        async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
            Err(StorageError::List {
                prefix: prefix.to_owned(),
                reason: "disk on fire".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn failed_fetch_is_not_an_empty_vault() {
        let store = RecordStore::open(Arc::new(FailingScans(MemoryBackend::new())))
            .await
            .unwrap();
        let account = store.add_account(new_account("a@example.com")).await.unwrap();
        let owner = Owner::new(account.id);

        let err = assemble(&store, &owner, SyncOptions::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(StorageError::List { .. })));
    }
}
