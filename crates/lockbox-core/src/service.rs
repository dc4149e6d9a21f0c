//! Vault service: the boundary operations a transport calls.
//!
//! Each method takes the raw request body where there is one, so decoding
//! failures surface as [`DecodeError`] before anything is written. Every
//! owner-scoped method takes an [`Owner`], and the only way to get one is
//! [`VaultService::authenticate`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::{DecodeError, IdentityError, RecordKind, StoreError, VaultError};
use crate::identity::{IdentityGate, Owner};
use crate::model::{AccountLookup, KeyPair, NewAccount};
use crate::normalize::{self, CipherSubmission, FolderSubmission};
use crate::store::{self, RecordStore};
use crate::sync::{self, SyncOptions, SyncSnapshot};
use crate::view::{CipherView, FolderView, ListResponse, Profile};

/// A bulk import request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImportSubmission {
    ciphers: Vec<CipherSubmission>,
    folders: Vec<FolderSubmission>,
    folder_relationships: Vec<FolderRelationship>,
}

/// Files the cipher at index `key` into the folder at index `value`.
#[derive(Debug, Deserialize)]
struct FolderRelationship {
    key: usize,
    value: usize,
}

/// What a bulk import stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub folders: usize,
    pub ciphers: usize,
}

/// The vault operations, composed from the record store, normalizer and
/// sync assembler.
#[derive(Clone)]
pub struct VaultService {
    store: RecordStore,
    gate: Arc<dyn IdentityGate>,
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl VaultService {
    #[must_use]
    pub fn new(store: RecordStore, gate: Arc<dyn IdentityGate>) -> Self {
        Self { store, gate }
    }

    /// Resolve a request credential to an [`Owner`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Identity`] if the gate rejects the credential or
    /// the verified email has no account.
    pub async fn authenticate(&self, credential: &str) -> Result<Owner, VaultError> {
        let email = self.gate.resolve(credential).await?;
        let account = match self.store.get_account(AccountLookup::Email(&email)).await {
            Ok(account) => account,
            Err(StoreError::NotFound { .. }) => return Err(IdentityError::UnknownAccount.into()),
            Err(e) => return Err(e.into()),
        };
        Ok(Owner::new(account.id))
    }

    // ── Accounts ─────────────────────────────────────────────────────

    /// Provision an account from a registration body.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body or an unusable
    /// email, and [`VaultError::Store`] with a uniqueness violation if the
    /// email is taken.
    pub async fn register(&self, body: &[u8]) -> Result<Profile, VaultError> {
        let new: NewAccount = normalize::decode(body, "registration")?;
        if !new.email.contains('@') {
            return Err(DecodeError::Invalid {
                what: "registration",
                reason: "email address is required".to_owned(),
            }
            .into());
        }
        let account = self.store.add_account(new).await?;
        info!(account_id = %account.id, "account registered");
        Ok(Profile::from(account))
    }

    /// The caller's profile.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the account cannot be read.
    pub async fn profile(&self, owner: &Owner) -> Result<Profile, VaultError> {
        Ok(Profile::from(self.store.account(owner).await?))
    }

    /// Overwrite the caller's key pair.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body, or
    /// [`VaultError::Store`] if the account cannot be updated.
    pub async fn update_keys(&self, owner: &Owner, body: &[u8]) -> Result<Profile, VaultError> {
        let key_pair: KeyPair = normalize::decode(body, "key pair")?;
        let mut account = self.store.account(owner).await?;
        account.key_pair = key_pair;
        let account = self.store.update_account_info(&account).await?;
        info!(account_id = %owner.id(), "key pair updated");
        Ok(Profile::from(account))
    }

    // ── Ciphers ──────────────────────────────────────────────────────

    /// All of the caller's ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the ciphers cannot be read.
    pub async fn list_ciphers(&self, owner: &Owner) -> Result<ListResponse<CipherView>, VaultError> {
        let ciphers = self.store.get_ciphers(owner).await?;
        Ok(ListResponse::new(
            ciphers.into_iter().map(CipherView::details).collect(),
        ))
    }

    /// Create a cipher from a submission body.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body, or
    /// [`VaultError::Store`] if it cannot be stored.
    pub async fn create_cipher(&self, owner: &Owner, body: &[u8]) -> Result<CipherView, VaultError> {
        let draft = normalize::normalize(normalize::from_slice(body)?);
        let record = self.store.new_cipher(draft, owner).await?;
        info!(owner_id = %owner.id(), cipher_id = %record.id, "cipher created");
        Ok(CipherView::single(record))
    }

    /// One of the caller's ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] with `NotFound` if the caller has no such
    /// cipher.
    pub async fn get_cipher(&self, owner: &Owner, id: &str) -> Result<CipherView, VaultError> {
        Ok(CipherView::single(self.store.get_cipher(owner, id).await?))
    }

    /// Replace one of the caller's ciphers with a submission body.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body, or
    /// [`VaultError::Store`] if the caller has no such cipher or the update
    /// is stale.
    pub async fn update_cipher(
        &self,
        owner: &Owner,
        id: &str,
        body: &[u8],
    ) -> Result<CipherView, VaultError> {
        let draft = normalize::normalize(normalize::from_slice(body)?);
        let record = self.store.update_cipher(draft, owner, id).await?;
        info!(owner_id = %owner.id(), cipher_id = %record.id, "cipher updated");
        Ok(CipherView::single(record))
    }

    /// Delete one of the caller's ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] with `NotFound` if the caller has no such
    /// cipher.
    pub async fn delete_cipher(&self, owner: &Owner, id: &str) -> Result<(), VaultError> {
        self.store.delete_cipher(owner, id).await?;
        info!(owner_id = %owner.id(), cipher_id = %id, "cipher deleted");
        Ok(())
    }

    /// Bulk import folders and ciphers.
    ///
    /// The whole body is decoded, normalized and checked first; a rejected
    /// body writes nothing. Rows are then stored one by one and the first
    /// persistence failure aborts the rest. Rows stored before that failure
    /// stay.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body or a relationship
    /// pointing outside the submitted lists, [`VaultError::Store`] with
    /// [`StoreError::NotFound`] if a cipher names a folder the caller does
    /// not have, or [`VaultError::Store`] if a row cannot be stored.
    pub async fn import(&self, owner: &Owner, body: &[u8]) -> Result<ImportSummary, VaultError> {
        let submission: ImportSubmission = normalize::decode(body, "import")?;

        let mut drafts: Vec<_> = submission
            .ciphers
            .into_iter()
            .map(normalize::normalize)
            .collect();
        for rel in &submission.folder_relationships {
            if rel.key >= drafts.len() || rel.value >= submission.folders.len() {
                return Err(DecodeError::Invalid {
                    what: "import",
                    reason: format!(
                        "folder relationship {} -> {} is out of range",
                        rel.key, rel.value
                    ),
                }
                .into());
            }
        }

        // Ciphers not placed by a relationship keep their own folder id,
        // which must name one of the caller's existing folders.
        let placed: HashSet<usize> = submission
            .folder_relationships
            .iter()
            .map(|rel| rel.key)
            .collect();
        if drafts
            .iter()
            .enumerate()
            .any(|(i, draft)| !placed.contains(&i) && draft.folder_id.is_some())
        {
            let existing: HashSet<String> = self
                .store
                .get_folders(owner)
                .await?
                .into_iter()
                .map(|f| f.id)
                .collect();
            for (i, draft) in drafts.iter().enumerate() {
                if placed.contains(&i) {
                    continue;
                }
                let Some(folder_id) = &draft.folder_id else {
                    continue;
                };
                if !store::parse_id(folder_id).is_some_and(|id| existing.contains(&id)) {
                    return Err(StoreError::NotFound {
                        kind: RecordKind::Folder,
                    }
                    .into());
                }
            }
        }

        let mut folder_ids = Vec::with_capacity(submission.folders.len());
        for folder in submission.folders {
            folder_ids.push(self.store.add_folder(folder.name, owner).await?.id);
        }
        for rel in &submission.folder_relationships {
            drafts[rel.key].folder_id = Some(folder_ids[rel.value].clone());
        }

        let mut summary = ImportSummary {
            folders: folder_ids.len(),
            ciphers: 0,
        };
        for draft in drafts {
            self.store.new_cipher(draft, owner).await?;
            summary.ciphers += 1;
        }

        info!(
            owner_id = %owner.id(),
            folders = summary.folders,
            ciphers = summary.ciphers,
            "import complete"
        );
        Ok(summary)
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// All of the caller's folders.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the folders cannot be read.
    pub async fn list_folders(&self, owner: &Owner) -> Result<ListResponse<FolderView>, VaultError> {
        let folders = self.store.get_folders(owner).await?;
        Ok(ListResponse::new(
            folders.into_iter().map(FolderView::from).collect(),
        ))
    }

    /// Create a folder from a `{"name": ...}` body.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body.
    pub async fn create_folder(&self, owner: &Owner, body: &[u8]) -> Result<FolderView, VaultError> {
        let submission = normalize::folder_from_slice(body)?;
        let folder = self.store.add_folder(submission.name, owner).await?;
        info!(owner_id = %owner.id(), folder_id = %folder.id, "folder created");
        Ok(FolderView::from(folder))
    }

    /// One of the caller's folders.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] with `NotFound` if the caller has no such
    /// folder.
    pub async fn get_folder(&self, owner: &Owner, id: &str) -> Result<FolderView, VaultError> {
        Ok(FolderView::from(self.store.get_folder(owner, id).await?))
    }

    /// Rename one of the caller's folders.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decode`] for a malformed body, or
    /// [`VaultError::Store`] with `NotFound` if the caller has no such folder.
    pub async fn update_folder(
        &self,
        owner: &Owner,
        id: &str,
        body: &[u8],
    ) -> Result<FolderView, VaultError> {
        let submission = normalize::folder_from_slice(body)?;
        let folder = self.store.update_folder(owner, id, submission.name).await?;
        info!(owner_id = %owner.id(), folder_id = %folder.id, "folder updated");
        Ok(FolderView::from(folder))
    }

    /// Delete one of the caller's folders, unfiling its ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] with `NotFound` if the caller has no such
    /// folder.
    pub async fn delete_folder(&self, owner: &Owner, id: &str) -> Result<(), VaultError> {
        self.store.delete_folder(owner, id).await?;
        info!(owner_id = %owner.id(), folder_id = %id, "folder deleted");
        Ok(())
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// The caller's full-vault snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if any part of the vault cannot be read.
    pub async fn sync(&self, owner: &Owner, options: SyncOptions) -> Result<SyncSnapshot, VaultError> {
        Ok(sync::assemble(&self.store, owner, options).await?)
    }
}
