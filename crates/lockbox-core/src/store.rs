//! Record store: owner-scoped persistence of accounts, ciphers and folders.
//!
//! Relations are laid out as key prefixes in a [`StorageBackend`]:
//!
//! ```text
//! meta/schema                       schema version marker
//! accounts/id/{account_id}          account row
//! accounts/email/{hex(email)}       unique index -> account id
//! accounts/refresh/{hex(token)}     unique index -> account id
//! ciphers/{owner_id}/{cipher_id}    cipher row
//! folders/{owner_id}/{folder_id}    folder row
//! ```
//!
//! The owner id is part of every cipher and folder key, so each read or write
//! is a compound (owner AND id) predicate that the engine evaluates in a
//! single conditional operation. Another owner's row is simply a different
//! key; there is no fetch-then-check step.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::TimeDelta;
use lockbox_storage::{Mutation, StorageBackend, StorageError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::RevisionClock;
use crate::error::{RecordKind, StoreError};
use crate::identity::Owner;
use crate::model::{
    Account, AccountLookup, CipherDraft, CipherRecord, Folder, NewAccount,
};

/// Schema version written to `meta/schema` and checked at open.
pub const SCHEMA_VERSION: &str = "1";

const SCHEMA_KEY: &str = "meta/schema";

/// How far a stored revision may be ahead of the client's last seen
/// revision before an update is refused as stale.
const STALE_TOLERANCE_MS: i64 = 1_000;

fn account_key(id: &str) -> String {
    format!("accounts/id/{id}")
}

fn email_index_key(email: &str) -> String {
    format!("accounts/email/{}", hex::encode(email))
}

fn refresh_index_key(token: &str) -> String {
    format!("accounts/refresh/{}", hex::encode(token))
}

fn cipher_prefix(owner_id: &str) -> String {
    format!("ciphers/{owner_id}/")
}

fn cipher_key(owner_id: &str, id: &str) -> String {
    format!("ciphers/{owner_id}/{id}")
}

fn folder_prefix(owner_id: &str) -> String {
    format!("folders/{owner_id}/")
}

fn folder_key(owner_id: &str, id: &str) -> String {
    format!("folders/{owner_id}/{id}")
}

/// Emails are compared trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Canonical form of a client-supplied record id, or `None` if it is not a
/// UUID. A malformed id can never name a row.
pub(crate) fn parse_id(id: &str) -> Option<String> {
    uuid::Uuid::parse_str(id)
        .ok()
        .map(|u| u.hyphenated().to_string())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn corrupt(key: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_owned(),
        reason: e.to_string(),
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| corrupt(key, e))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| corrupt(key, e))
}

/// Carries a domain error out of a storage [`Mutation`], which can only
/// return a [`StorageError`].
#[derive(Clone, Default)]
struct Rejection(Arc<Mutex<Option<StoreError>>>);

impl Rejection {
    fn reject(&self, key: &str, err: StoreError) -> StorageError {
        let reason = err.to_string();
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(err);
        }
        StorageError::Mutation {
            key: key.to_owned(),
            reason,
        }
    }

    fn into_error(self, fallback: StorageError) -> StoreError {
        self.0
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or(StoreError::Storage(fallback))
    }
}

/// Owner-scoped persistence for accounts, ciphers and folders.
///
/// Cheap to clone; clones share the backend and the revision clock.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<RevisionClock>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Open a record store over `backend`, writing the schema marker on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaMismatch`] if the backend holds data
    /// written under a different schema, or [`StoreError::Storage`] if the
    /// backend fails.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        if backend.insert(SCHEMA_KEY, SCHEMA_VERSION.as_bytes()).await? {
            info!(schema = SCHEMA_VERSION, "initialized empty record store");
        } else {
            let found = backend.get(SCHEMA_KEY).await?.unwrap_or_default();
            if found != SCHEMA_VERSION.as_bytes() {
                return Err(StoreError::SchemaMismatch {
                    found: String::from_utf8_lossy(&found).into_owned(),
                    expected: SCHEMA_VERSION,
                });
            }
        }

        Ok(Self {
            backend,
            clock: Arc::new(RevisionClock::new()),
        })
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.backend
            .get(key)
            .await?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    async fn load_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, StoreError> {
        self.backend
            .scan(prefix)
            .await?
            .iter()
            .map(|(key, bytes)| decode(key, bytes))
            .collect()
    }

    /// Read-modify-write the row at `key` in one engine operation. Returns
    /// the row before and after `apply` ran.
    async fn update_row<T, F>(
        &self,
        key: &str,
        kind: RecordKind,
        apply: F,
    ) -> Result<(T, T), StoreError>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce(&mut T) -> Result<(), StoreError> + Send + 'static,
    {
        let rejection = Rejection::default();
        let slot = rejection.clone();
        let row_key = key.to_owned();
        let mutation: Mutation = Box::new(move |before: &[u8]| {
            let mut row: T =
                decode(&row_key, before).map_err(|e| slot.reject(&row_key, e))?;
            apply(&mut row).map_err(|e| slot.reject(&row_key, e))?;
            encode(&row_key, &row).map_err(|e| slot.reject(&row_key, e))
        });

        match self.backend.update(key, mutation).await {
            Ok(Some(replaced)) => Ok((
                decode(key, &replaced.before)?,
                decode(key, &replaced.after)?,
            )),
            Ok(None) => Err(StoreError::not_found(kind)),
            Err(e) => Err(rejection.into_error(e)),
        }
    }

    async fn release_index(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(error = %e, "failed to release account index");
        }
    }

    // ── Accounts ─────────────────────────────────────────────────────

    /// Provision a new account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniquenessViolation`] if the email is taken.
    pub async fn add_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let account = Account {
            id: new_id(),
            name: new.name.filter(|n| !n.trim().is_empty()),
            email: normalize_email(&new.email),
            master_password_hash: new.master_password_hash,
            master_password_hint: new.master_password_hint.filter(|h| !h.trim().is_empty()),
            key: new.key,
            refresh_token: None,
            key_pair: new.keys.unwrap_or_default(),
            two_factor_secret: None,
            kdf: new.kdf,
            kdf_iterations: new.kdf_iterations,
        };
        let key = account_key(&account.id);
        let row = encode(&key, &account)?;

        let index = email_index_key(&account.email);
        if !self.backend.insert(&index, account.id.as_bytes()).await? {
            return Err(StoreError::UniquenessViolation { field: "email" });
        }
        match self.backend.insert(&key, &row).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_index(&index).await;
                return Err(StoreError::UniquenessViolation { field: "account id" });
            }
            Err(e) => {
                self.release_index(&index).await;
                return Err(e.into());
            }
        }

        info!(account_id = %account.id, "account created");
        Ok(account)
    }

    async fn account_by_index(&self, index: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.backend.get(index).await? else {
            return Ok(None);
        };
        let id = String::from_utf8(id).map_err(|e| corrupt(index, e))?;
        self.load(&account_key(&id)).await
    }

    /// Look up an account by email or by refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no account matches.
    pub async fn get_account(&self, lookup: AccountLookup<'_>) -> Result<Account, StoreError> {
        let found = match lookup {
            AccountLookup::Email(email) => {
                let email = normalize_email(email);
                self.account_by_index(&email_index_key(&email))
                    .await?
                    .filter(|account| account.email == email)
            }
            AccountLookup::RefreshToken(token) if token.is_empty() => None,
            AccountLookup::RefreshToken(token) => self
                .account_by_index(&refresh_index_key(token))
                .await?
                .filter(|account| account.refresh_token.as_deref() == Some(token)),
        };
        found.ok_or(StoreError::not_found(RecordKind::Account))
    }

    /// The caller's own account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the account row is gone.
    pub async fn account(&self, owner: &Owner) -> Result<Account, StoreError> {
        self.load(&account_key(owner.id()))
            .await?
            .ok_or(StoreError::not_found(RecordKind::Account))
    }

    /// Overwrite the refresh token and key pair of the account with
    /// `account.id`. Every other field of `account` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no account has that id, or
    /// [`StoreError::UniquenessViolation`] if another account holds the
    /// refresh token.
    pub async fn update_account_info(&self, account: &Account) -> Result<Account, StoreError> {
        let refresh_token = account.refresh_token.clone().filter(|t| !t.is_empty());

        let mut claimed = None;
        if let Some(token) = &refresh_token {
            let index = refresh_index_key(token);
            if self.backend.insert(&index, account.id.as_bytes()).await? {
                claimed = Some(index);
            } else if self.backend.get(&index).await?.as_deref() != Some(account.id.as_bytes()) {
                return Err(StoreError::UniquenessViolation {
                    field: "refresh token",
                });
            }
        }

        let next_token = refresh_token.clone();
        let key_pair = account.key_pair.clone();
        let result = self
            .update_row::<Account, _>(&account_key(&account.id), RecordKind::Account, move |row| {
                row.refresh_token = next_token;
                row.key_pair = key_pair;
                Ok(())
            })
            .await;

        let (before, after) = match result {
            Ok(pair) => pair,
            Err(e) => {
                if let Some(index) = claimed {
                    self.release_index(&index).await;
                }
                return Err(e);
            }
        };

        // The row is committed. A leftover index entry no longer resolves,
        // since lookups re-check the row's token.
        if let Some(old) = before.refresh_token.filter(|old| Some(old) != refresh_token.as_ref()) {
            self.release_index(&refresh_index_key(&old)).await;
        }

        debug!(account_id = %after.id, "account keys updated");
        Ok(after)
    }

    /// Set or clear the caller's two-factor secret.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the account row is gone.
    pub async fn update_two_factor_secret(
        &self,
        owner: &Owner,
        secret: Option<String>,
    ) -> Result<(), StoreError> {
        let secret = secret.filter(|s| !s.is_empty());
        self.update_row::<Account, _>(&account_key(owner.id()), RecordKind::Account, move |row| {
            row.two_factor_secret = secret;
            Ok(())
        })
        .await?;
        debug!(account_id = %owner.id(), "two-factor secret updated");
        Ok(())
    }

    // ── Ciphers ──────────────────────────────────────────────────────

    /// Fetch one of the owner's ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no cipher with this
    /// id, whether or not another owner does.
    pub async fn get_cipher(&self, owner: &Owner, id: &str) -> Result<CipherRecord, StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Cipher))?;
        let record = self
            .load(&cipher_key(owner.id(), &id))
            .await?
            .ok_or(StoreError::not_found(RecordKind::Cipher))?;
        self.detach_missing_folder(owner, record).await
    }

    /// All of the owner's ciphers, ordered by id. Empty if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] or [`StoreError::Corrupt`] if the rows
    /// cannot be read. A failed read is never reported as an empty list.
    pub async fn get_ciphers(&self, owner: &Owner) -> Result<Vec<CipherRecord>, StoreError> {
        let mut records: Vec<CipherRecord> = self.load_all(&cipher_prefix(owner.id())).await?;
        if records.iter().any(|r| r.folder_id.is_some()) {
            let folders: HashSet<String> = self
                .get_folders(owner)
                .await?
                .into_iter()
                .map(|f| f.id)
                .collect();
            for record in &mut records {
                if record.folder_id.as_ref().is_some_and(|id| !folders.contains(id)) {
                    record.folder_id = None;
                }
            }
        }
        Ok(records)
    }

    /// A cipher can outlive its folder when the folder is deleted while the
    /// cipher is being filed into it. Such a cipher reads as unfiled.
    async fn detach_missing_folder(
        &self,
        owner: &Owner,
        mut record: CipherRecord,
    ) -> Result<CipherRecord, StoreError> {
        if let Some(folder_id) = &record.folder_id {
            if self.backend.get(&folder_key(owner.id(), folder_id)).await?.is_none() {
                record.folder_id = None;
            }
        }
        Ok(record)
    }

    /// Resolve a draft's folder reference against the owner's folders.
    async fn owned_folder(
        &self,
        owner: &Owner,
        folder_id: Option<String>,
    ) -> Result<Option<String>, StoreError> {
        let Some(folder_id) = folder_id else {
            return Ok(None);
        };
        let id = parse_id(&folder_id).ok_or(StoreError::not_found(RecordKind::Folder))?;
        if self.backend.get(&folder_key(owner.id(), &id)).await?.is_none() {
            return Err(StoreError::not_found(RecordKind::Folder));
        }
        Ok(Some(id))
    }

    /// Store a new cipher under a fresh id and revision stamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the draft names a folder the owner
    /// does not have.
    pub async fn new_cipher(
        &self,
        draft: CipherDraft,
        owner: &Owner,
    ) -> Result<CipherRecord, StoreError> {
        let folder_id = self.owned_folder(owner, draft.folder_id).await?;
        let record = CipherRecord {
            id: new_id(),
            owner_id: owner.id().to_owned(),
            cipher_type: draft.cipher_type,
            data: draft.data,
            folder_id,
            favorite: draft.favorite,
            revision_date: self.clock.now(),
        };

        let key = cipher_key(owner.id(), &record.id);
        if !self.backend.insert(&key, &encode(&key, &record)?).await? {
            return Err(StoreError::UniquenessViolation { field: "cipher id" });
        }

        debug!(owner_id = %owner.id(), cipher_id = %record.id, "cipher created");
        self.detach_missing_folder(owner, record).await
    }

    /// Replace type, data, folder and favorite of one of the owner's ciphers
    /// and give it a fresh revision stamp.
    ///
    /// If the draft carries the revision the client last saw and the stored
    /// revision is more than a second newer, the update is refused.
    /// Without it the last write wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no such cipher (or
    /// no such folder), or [`StoreError::StaleRevision`] as described above.
    pub async fn update_cipher(
        &self,
        draft: CipherDraft,
        owner: &Owner,
        id: &str,
    ) -> Result<CipherRecord, StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Cipher))?;
        let folder_id = self.owned_folder(owner, draft.folder_id).await?;
        let clock = Arc::clone(&self.clock);

        let (_, record) = self
            .update_row::<CipherRecord, _>(
                &cipher_key(owner.id(), &id),
                RecordKind::Cipher,
                move |row| {
                    let stale = draft.last_known_revision.is_some_and(|seen| {
                        row.revision_date.signed_duration_since(seen)
                            > TimeDelta::milliseconds(STALE_TOLERANCE_MS)
                    });
                    if stale {
                        return Err(StoreError::StaleRevision {
                            kind: RecordKind::Cipher,
                        });
                    }
                    row.cipher_type = draft.cipher_type;
                    row.data = draft.data;
                    row.folder_id = folder_id;
                    row.favorite = draft.favorite;
                    row.revision_date = clock.after(Some(row.revision_date));
                    Ok(())
                },
            )
            .await?;

        debug!(owner_id = %owner.id(), cipher_id = %record.id, "cipher updated");
        self.detach_missing_folder(owner, record).await
    }

    /// Delete one of the owner's ciphers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no such cipher.
    pub async fn delete_cipher(&self, owner: &Owner, id: &str) -> Result<(), StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Cipher))?;
        if !self.backend.delete(&cipher_key(owner.id(), &id)).await? {
            return Err(StoreError::not_found(RecordKind::Cipher));
        }
        debug!(owner_id = %owner.id(), cipher_id = %id, "cipher deleted");
        Ok(())
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Create a folder under a fresh id and revision stamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend fails.
    pub async fn add_folder(&self, name: String, owner: &Owner) -> Result<Folder, StoreError> {
        let folder = Folder {
            id: new_id(),
            owner_id: owner.id().to_owned(),
            name,
            revision_date: self.clock.now(),
        };

        let key = folder_key(owner.id(), &folder.id);
        if !self.backend.insert(&key, &encode(&key, &folder)?).await? {
            return Err(StoreError::UniquenessViolation { field: "folder id" });
        }

        debug!(owner_id = %owner.id(), folder_id = %folder.id, "folder created");
        Ok(folder)
    }

    /// Fetch one of the owner's folders.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no such folder.
    pub async fn get_folder(&self, owner: &Owner, id: &str) -> Result<Folder, StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Folder))?;
        self.load(&folder_key(owner.id(), &id))
            .await?
            .ok_or(StoreError::not_found(RecordKind::Folder))
    }

    /// All of the owner's folders, ordered by id. Empty if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] or [`StoreError::Corrupt`] if the rows
    /// cannot be read.
    pub async fn get_folders(&self, owner: &Owner) -> Result<Vec<Folder>, StoreError> {
        self.load_all(&folder_prefix(owner.id())).await
    }

    /// Rename one of the owner's folders and give it a fresh revision stamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no such folder.
    pub async fn update_folder(
        &self,
        owner: &Owner,
        id: &str,
        name: String,
    ) -> Result<Folder, StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Folder))?;
        let clock = Arc::clone(&self.clock);

        let (_, folder) = self
            .update_row::<Folder, _>(&folder_key(owner.id(), &id), RecordKind::Folder, move |row| {
                row.name = name;
                row.revision_date = clock.after(Some(row.revision_date));
                Ok(())
            })
            .await?;

        debug!(owner_id = %owner.id(), folder_id = %folder.id, "folder updated");
        Ok(folder)
    }

    /// Delete one of the owner's folders. Ciphers filed in it move to "no
    /// folder" and get a fresh revision stamp.
    ///
    /// Ciphers are moved out before the folder row goes, so a failure part
    /// way through leaves the folder in place and the delete can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner has no such folder.
    pub async fn delete_folder(&self, owner: &Owner, id: &str) -> Result<(), StoreError> {
        let id = parse_id(id).ok_or(StoreError::not_found(RecordKind::Folder))?;
        let key = folder_key(owner.id(), &id);
        if self.backend.get(&key).await?.is_none() {
            return Err(StoreError::not_found(RecordKind::Folder));
        }

        let mut moved = 0_usize;
        let filed: Vec<CipherRecord> = self.load_all(&cipher_prefix(owner.id())).await?;
        for cipher in filed {
            if cipher.folder_id.as_deref() != Some(id.as_str()) {
                continue;
            }
            let clock = Arc::clone(&self.clock);
            let folder_id = id.clone();
            let result = self
                .update_row::<CipherRecord, _>(
                    &cipher_key(owner.id(), &cipher.id),
                    RecordKind::Cipher,
                    move |row| {
                        if row.folder_id.as_deref() == Some(folder_id.as_str()) {
                            row.folder_id = None;
                            row.revision_date = clock.after(Some(row.revision_date));
                        }
                        Ok(())
                    },
                )
                .await;
            match result {
                Ok(_) => moved += 1,
                // Deleted concurrently; nothing left to move.
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if !self.backend.delete(&key).await? {
            return Err(StoreError::not_found(RecordKind::Folder));
        }

        debug!(owner_id = %owner.id(), folder_id = %id, moved, "folder deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{CipherData, CipherType, KeyPair};
    use std::sync::atomic::{AtomicBool, Ordering};

    use lockbox_storage::MemoryBackend;

    pub(crate) fn new_account(email: &str) -> NewAccount {
        NewAccount {
            name: Some("Tester".to_owned()),
            email: email.to_owned(),
            master_password_hash: "hash".to_owned(),
            master_password_hint: None,
            key: "2.key".to_owned(),
            keys: None,
            kdf: 0,
            kdf_iterations: 600_000,
        }
    }

    async fn store_with_owners() -> (RecordStore, Owner, Owner) {
        let store = RecordStore::open(Arc::new(MemoryBackend::new())).await.unwrap();
        let a = store.add_account(new_account("a@example.com")).await.unwrap();
        let b = store.add_account(new_account("b@example.com")).await.unwrap();
        (
            store,
            Owner::new(a.id),
            Owner::new(b.id),
        )
    }

    fn login(username: &str) -> CipherDraft {
        CipherDraft {
            cipher_type: CipherType::LOGIN,
            data: CipherData {
                username: Some(username.to_owned()),
                ..CipherData::default()
            },
            ..CipherDraft::default()
        }
    }

    #[tokio::test]
    async fn open_writes_and_checks_schema_marker() {
        let backend = Arc::new(MemoryBackend::new());
        RecordStore::open(backend.clone()).await.unwrap();
        assert_eq!(
            backend.get(SCHEMA_KEY).await.unwrap(),
            Some(SCHEMA_VERSION.as_bytes().to_vec())
        );
        // Reopening the same data is fine.
        RecordStore::open(backend).await.unwrap();
    }

    #[tokio::test]
    async fn open_rejects_foreign_schema() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(SCHEMA_KEY, b"99").await.unwrap();
        let err = RecordStore::open(backend).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { found, .. } if found == "99"));
    }

    #[tokio::test]
    async fn email_is_unique_case_insensitively() {
        let (store, _, _) = store_with_owners().await;
        let err = store
            .add_account(new_account("  A@Example.COM "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniquenessViolation { field: "email" }));
    }

    #[tokio::test]
    async fn account_lookup_by_email_and_refresh_token() {
        let (store, a, _) = store_with_owners().await;
        let account = store
            .get_account(AccountLookup::Email("A@example.com"))
            .await
            .unwrap();
        assert_eq!(account.id, a.id());

        let mut updated = account.clone();
        updated.refresh_token = Some("r1".to_owned());
        store.update_account_info(&updated).await.unwrap();
        let by_token = store
            .get_account(AccountLookup::RefreshToken("r1"))
            .await
            .unwrap();
        assert_eq!(by_token.id, a.id());

        updated.refresh_token = Some("r2".to_owned());
        store.update_account_info(&updated).await.unwrap();
        let err = store
            .get_account(AccountLookup::RefreshToken("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: RecordKind::Account }));
        assert!(store.get_account(AccountLookup::RefreshToken("")).await.is_err());
        assert!(store.get_account(AccountLookup::Email("nobody@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn update_account_info_overwrites_only_token_and_keys() {
        let (store, a, _) = store_with_owners().await;
        let mut account = store.account(&a).await.unwrap();
        account.name = Some("Changed".to_owned());
        account.master_password_hash = "other".to_owned();
        account.key_pair = KeyPair {
            encrypted_private_key: "priv".to_owned(),
            public_key: "pub".to_owned(),
        };

        let stored = store.update_account_info(&account).await.unwrap();
        assert_eq!(stored.key_pair.public_key, "pub");
        assert_eq!(stored.name.as_deref(), Some("Tester"));
        assert_eq!(stored.master_password_hash, "hash");
    }

    #[tokio::test]
    async fn update_account_info_unknown_id_is_not_found() {
        let (store, a, _) = store_with_owners().await;
        let mut account = store.account(&a).await.unwrap();
        account.id = new_id();
        account.refresh_token = Some("orphan".to_owned());
        let err = store.update_account_info(&account).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: RecordKind::Account }));
        // The token claimed for the missing account was released.
        assert!(store.backend.get(&refresh_index_key("orphan")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_token_cannot_be_shared() {
        let (store, a, b) = store_with_owners().await;
        let mut first = store.account(&a).await.unwrap();
        first.refresh_token = Some("shared".to_owned());
        store.update_account_info(&first).await.unwrap();

        let mut second = store.account(&b).await.unwrap();
        second.refresh_token = Some("shared".to_owned());
        let err = store.update_account_info(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::UniquenessViolation { .. }));
    }

    #[tokio::test]
    async fn two_factor_secret_rotates() {
        let (store, a, _) = store_with_owners().await;
        store
            .update_two_factor_secret(&a, Some("JBSWY3DP".to_owned()))
            .await
            .unwrap();
        assert_eq!(
            store.account(&a).await.unwrap().two_factor_secret.as_deref(),
            Some("JBSWY3DP")
        );
        store.update_two_factor_secret(&a, None).await.unwrap();
        assert!(store.account(&a).await.unwrap().two_factor_secret.is_none());
    }

    #[tokio::test]
    async fn other_owner_sees_not_found_everywhere() {
        let (store, a, b) = store_with_owners().await;
        let cipher = store.new_cipher(login("u"), &a).await.unwrap();
        let folder = store.add_folder("Work".to_owned(), &a).await.unwrap();

        assert!(matches!(
            store.get_cipher(&b, &cipher.id).await,
            Err(StoreError::NotFound { kind: RecordKind::Cipher })
        ));
        assert!(matches!(
            store.update_cipher(login("x"), &b, &cipher.id).await,
            Err(StoreError::NotFound { kind: RecordKind::Cipher })
        ));
        assert!(matches!(
            store.delete_cipher(&b, &cipher.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_folder(&b, &folder.id).await,
            Err(StoreError::NotFound { kind: RecordKind::Folder })
        ));
        assert!(matches!(
            store.update_folder(&b, &folder.id, "Stolen".to_owned()).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete_folder(&b, &folder.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.get_ciphers(&b).await.unwrap().is_empty());
        assert!(store.get_folders(&b).await.unwrap().is_empty());

        // A's data is untouched.
        assert_eq!(store.get_cipher(&a, &cipher.id).await.unwrap(), cipher);
        assert_eq!(store.get_folder(&a, &folder.id).await.unwrap(), folder);
    }

    #[tokio::test]
    async fn cannot_file_cipher_into_another_owners_folder() {
        let (store, a, b) = store_with_owners().await;
        let folder = store.add_folder("Work".to_owned(), &a).await.unwrap();
        let mut draft = login("u");
        draft.folder_id = Some(folder.id);
        let err = store.new_cipher(draft, &b).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: RecordKind::Folder }));
    }

    #[tokio::test]
    async fn new_ciphers_get_fresh_ids_and_non_decreasing_stamps() {
        let (store, a, _) = store_with_owners().await;
        let mut seen = std::collections::HashSet::new();
        let mut last = None;
        for i in 0..20 {
            let record = store.new_cipher(login(&format!("u{i}")), &a).await.unwrap();
            assert!(seen.insert(record.id.clone()));
            if let Some(prev) = last {
                assert!(record.revision_date >= prev);
            }
            last = Some(record.revision_date);
        }
        assert_eq!(store.get_ciphers(&a).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn update_bumps_stamp_and_replaces_fields() {
        let (store, a, _) = store_with_owners().await;
        let created = store.new_cipher(login("u"), &a).await.unwrap();

        let mut draft = login("u");
        draft.favorite = true;
        let updated = store.update_cipher(draft, &a, &created.id).await.unwrap();
        assert!(updated.revision_date > created.revision_date);
        assert!(updated.favorite);
        assert_eq!(updated.id, created.id);
        assert_eq!(store.get_cipher(&a, &created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn stale_update_is_refused_only_when_revision_is_sent() {
        let (store, a, _) = store_with_owners().await;
        let created = store.new_cipher(login("u"), &a).await.unwrap();

        let mut stale = login("late");
        stale.last_known_revision = Some(created.revision_date - TimeDelta::hours(1));
        let err = store.update_cipher(stale, &a, &created.id).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleRevision { kind: RecordKind::Cipher }));
        assert_eq!(store.get_cipher(&a, &created.id).await.unwrap(), created);

        let mut current = login("fresh");
        current.last_known_revision = Some(created.revision_date);
        store.update_cipher(current, &a, &created.id).await.unwrap();

        // No revision sent: last write wins.
        store.update_cipher(login("blind"), &a, &created.id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let (store, a, _) = store_with_owners().await;
        let created = store.new_cipher(login("u"), &a).await.unwrap();
        store.delete_cipher(&a, &created.id).await.unwrap();
        assert!(store.get_cipher(&a, &created.id).await.is_err());
        assert!(matches!(
            store.delete_cipher(&a, &created.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.get_ciphers(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let (store, a, _) = store_with_owners().await;
        for id in ["", "nope", "../folders/x", "ciphers/a"] {
            assert!(matches!(
                store.get_cipher(&a, id).await,
                Err(StoreError::NotFound { .. })
            ));
            assert!(matches!(
                store.delete_folder(&a, id).await,
                Err(StoreError::NotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn uppercase_id_names_the_same_row() {
        let (store, a, _) = store_with_owners().await;
        let created = store.new_cipher(login("u"), &a).await.unwrap();
        let fetched = store
            .get_cipher(&a, &created.id.to_uppercase())
            .await
            .unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn folders_rename_keeps_id() {
        let (store, a, _) = store_with_owners().await;
        let work = store.add_folder("Work".to_owned(), &a).await.unwrap();
        store.add_folder("Personal".to_owned(), &a).await.unwrap();

        let folders = store.get_folders(&a).await.unwrap();
        assert_eq!(folders.len(), 2);
        assert!(folders.iter().all(|f| f.revision_date.timestamp_millis() > 0));

        let job = store.update_folder(&a, &work.id, "Job".to_owned()).await.unwrap();
        assert_eq!(job.id, work.id);
        assert!(job.revision_date > work.revision_date);
        assert_eq!(store.get_folder(&a, &work.id).await.unwrap().name, "Job");
    }

    #[tokio::test]
    async fn deleting_folder_unfiles_its_ciphers() {
        let (store, a, _) = store_with_owners().await;
        let folder = store.add_folder("Work".to_owned(), &a).await.unwrap();
        let mut draft = login("u");
        draft.folder_id = Some(folder.id.clone());
        let filed = store.new_cipher(draft, &a).await.unwrap();
        let loose = store.new_cipher(login("v"), &a).await.unwrap();

        store.delete_folder(&a, &folder.id).await.unwrap();

        assert!(store.get_folders(&a).await.unwrap().is_empty());
        let unfiled = store.get_cipher(&a, &filed.id).await.unwrap();
        assert_eq!(unfiled.folder_id, None);
        assert!(unfiled.revision_date > filed.revision_date);
        assert_eq!(store.get_cipher(&a, &loose.id).await.unwrap(), loose);
    }

    #[tokio::test]
    async fn corrupt_row_fails_the_list_instead_of_hiding() {
        let backend = Arc::new(MemoryBackend::new());
        let store = RecordStore::open(backend.clone()).await.unwrap();
        let account = store.add_account(new_account("a@example.com")).await.unwrap();
        let owner = Owner::new(account.id);
        store.new_cipher(login("u"), &owner).await.unwrap();
        backend
            .insert(&cipher_key(owner.id(), &new_id()), b"{broken")
            .await
            .unwrap();

        let err = store.get_ciphers(&owner).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    /// A memory backend whose scans and deletes can be switched off.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryBackend,
        failing_scans: AtomicBool,
        failing_deletes: AtomicBool,
    }

    impl Flaky {
        fn fail_scans(&self, failing: bool) {
            self.failing_scans.store(failing, Ordering::SeqCst);
        }

        fn fail_deletes(&self, failing: bool) {
            self.failing_deletes.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for Flaky {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }
        async fn insert(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
            self.inner.insert(key, value).await
        }
        async fn update(
            &self,
            key: &str,
            mutation: Mutation,
        ) -> Result<Option<lockbox_storage::Replaced>, StorageError> {
            self.inner.update(key, mutation).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            if self.failing_deletes.load(Ordering::SeqCst) {
                return Err(StorageError::Delete {
                    key: key.to_owned(),
                    reason: "delete unavailable".to_owned(),
                });
            }
            self.inner.delete(key).await
        }
        async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
            if self.failing_scans.load(Ordering::SeqCst) {
                return Err(StorageError::List {
                    prefix: prefix.to_owned(),
                    reason: "scan unavailable".to_owned(),
                });
            }
            self.inner.scan(prefix).await
        }
    }

    #[tokio::test]
    async fn failed_folder_delete_keeps_folder_for_retry() {
        let backend = Arc::new(Flaky::default());
        let store = RecordStore::open(backend.clone()).await.unwrap();
        let account = store.add_account(new_account("a@example.com")).await.unwrap();
        let owner = Owner::new(account.id);
        let folder = store.add_folder("Work".to_owned(), &owner).await.unwrap();
        let mut draft = login("u");
        draft.folder_id = Some(folder.id.clone());
        let filed = store.new_cipher(draft, &owner).await.unwrap();

        backend.fail_scans(true);
        let err = store.delete_folder(&owner, &folder.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(StorageError::List { .. })));
        backend.fail_scans(false);

        assert_eq!(store.get_folder(&owner, &folder.id).await.unwrap(), folder);
        store.delete_folder(&owner, &folder.id).await.unwrap();
        assert!(matches!(
            store.get_folder(&owner, &folder.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.get_cipher(&owner, &filed.id).await.unwrap().folder_id, None);
    }

    #[tokio::test]
    async fn cipher_whose_folder_vanished_reads_as_unfiled() {
        let backend = Arc::new(MemoryBackend::new());
        let store = RecordStore::open(backend.clone()).await.unwrap();
        let account = store.add_account(new_account("a@example.com")).await.unwrap();
        let owner = Owner::new(account.id);
        let folder = store.add_folder("Work".to_owned(), &owner).await.unwrap();
        let mut draft = login("u");
        draft.folder_id = Some(folder.id.clone());
        let filed = store.new_cipher(draft, &owner).await.unwrap();
        let kept = store.add_folder("Home".to_owned(), &owner).await.unwrap();
        let mut draft = login("v");
        draft.folder_id = Some(kept.id.clone());
        let other = store.new_cipher(draft, &owner).await.unwrap();

        // A folder removed between a filing's folder check and its write.
        backend.delete(&folder_key(owner.id(), &folder.id)).await.unwrap();

        assert_eq!(store.get_cipher(&owner, &filed.id).await.unwrap().folder_id, None);
        let listed = store.get_ciphers(&owner).await.unwrap();
        let by_id = |id: &str| listed.iter().find(|c| c.id == id).unwrap().folder_id.clone();
        assert_eq!(by_id(&filed.id), None);
        assert_eq!(by_id(&other.id), Some(kept.id));
    }

    #[tokio::test]
    async fn committed_token_rotation_survives_index_cleanup_failure() {
        let backend = Arc::new(Flaky::default());
        let store = RecordStore::open(backend.clone()).await.unwrap();
        let mut account = store.add_account(new_account("a@example.com")).await.unwrap();
        account.refresh_token = Some("first".to_owned());
        store.update_account_info(&account).await.unwrap();

        backend.fail_deletes(true);
        account.refresh_token = Some("second".to_owned());
        let updated = store.update_account_info(&account).await.unwrap();
        backend.fail_deletes(false);

        assert_eq!(updated.refresh_token.as_deref(), Some("second"));
        let found = store
            .get_account(AccountLookup::RefreshToken("second"))
            .await
            .unwrap();
        assert_eq!(found.id, account.id);
        assert!(matches!(
            store.get_account(AccountLookup::RefreshToken("first")).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
