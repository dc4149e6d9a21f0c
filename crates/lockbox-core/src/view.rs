//! Wire projections of stored records.
//!
//! Presentation flags (`edit`, `organizationUseTotp`, `object`, empty
//! collection and attachment lists) are never stored. They are computed
//! here on every read.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Account, CipherData, CipherRecord, CipherType, Folder, LoginUri};

/// Object tag for a single cipher response.
pub const CIPHER_OBJECT: &str = "cipher";
/// Object tag for ciphers inside lists and sync snapshots.
pub const CIPHER_DETAILS_OBJECT: &str = "cipherDetails";

/// A cipher as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherView {
    pub id: String,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub folder_id: Option<String>,
    pub organization_id: Option<String>,
    pub favorite: bool,
    pub edit: bool,
    pub view_password: bool,
    pub organization_use_totp: bool,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub login: Option<LoginView>,
    pub card: Option<serde_json::Value>,
    pub identity: Option<serde_json::Value>,
    pub secure_note: Option<serde_json::Value>,
    pub fields: Option<serde_json::Value>,
    pub data: CipherData,
    pub attachments: Vec<serde_json::Value>,
    pub collection_ids: Vec<String>,
    pub revision_date: DateTime<Utc>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub object: &'static str,
}

/// The login block of a [`CipherView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginView {
    pub uri: Option<String>,
    pub uris: Option<Vec<LoginUri>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
}

impl CipherView {
    /// Project a stored cipher for a single-record response.
    #[must_use]
    pub fn single(record: CipherRecord) -> Self {
        Self::project(record, CIPHER_OBJECT)
    }

    /// Project a stored cipher for a list or sync response.
    #[must_use]
    pub fn details(record: CipherRecord) -> Self {
        Self::project(record, CIPHER_DETAILS_OBJECT)
    }

    fn project(record: CipherRecord, object: &'static str) -> Self {
        let data = record.data;
        let login = record.cipher_type.is_login().then(|| LoginView {
            uri: data.uri.clone(),
            uris: data.uris.clone(),
            username: data.username.clone(),
            password: data.password.clone(),
            totp: data.totp.clone(),
        });
        Self {
            id: record.id,
            cipher_type: record.cipher_type,
            folder_id: record.folder_id,
            organization_id: None,
            favorite: record.favorite,
            edit: true,
            view_password: true,
            organization_use_totp: false,
            name: data.name.clone(),
            notes: data.notes.clone(),
            login,
            card: data.card.clone(),
            identity: data.identity.clone(),
            secure_note: data.secure_note.clone(),
            fields: data.fields.clone(),
            data,
            attachments: Vec::new(),
            collection_ids: Vec::new(),
            revision_date: record.revision_date,
            deleted_date: None,
            object,
        }
    }
}

/// A folder as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub id: String,
    pub name: String,
    pub revision_date: DateTime<Utc>,
    pub object: &'static str,
}

impl From<Folder> for FolderView {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id,
            name: folder.name,
            revision_date: folder.revision_date,
            object: "folder",
        }
    }
}

/// The public-safe subset of an account.
///
/// The verification, premium and two-factor flags are fixed placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub premium: bool,
    pub master_password_hint: Option<String>,
    pub culture: &'static str,
    pub two_factor_enabled: bool,
    pub key: String,
    pub private_key: Option<String>,
    pub security_stamp: String,
    pub organizations: Vec<serde_json::Value>,
    pub object: &'static str,
}

impl From<Account> for Profile {
    fn from(account: Account) -> Self {
        let private_key = Some(account.key_pair.encrypted_private_key)
            .filter(|k| !k.is_empty());
        Self {
            security_stamp: account.id.clone(),
            id: account.id,
            name: account.name,
            email: account.email,
            email_verified: false,
            premium: false,
            master_password_hint: account.master_password_hint,
            culture: "en-US",
            two_factor_enabled: false,
            key: account.key,
            private_key,
            organizations: Vec::new(),
            object: "profile",
        }
    }
}

/// The `{ "data": [...], "object": "list" }` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub object: &'static str,
    pub continuation_token: Option<String>,
}

impl<T> ListResponse<T> {
    #[must_use]
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            object: "list",
            continuation_token: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}
