//! Stored entities: accounts, ciphers and folders.
//!
//! These are the rows persisted by the record store. Wire projections live in
//! [`crate::view`]; inbound shapes live in [`crate::normalize`]. Optional
//! string fields are `Option<String>` everywhere and are never `Some("")`
//! once they have passed through the normalizer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account: identity and client-held crypto material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Server-generated id. Never changes.
    pub id: String,
    pub name: Option<String>,
    /// Trimmed, lowercased, globally unique.
    pub email: String,
    pub master_password_hash: String,
    pub master_password_hint: Option<String>,
    /// Client-held symmetric key blob, opaque to the server.
    pub key: String,
    /// Rotatable refresh token, unique while present.
    pub refresh_token: Option<String>,
    pub key_pair: KeyPair,
    pub two_factor_secret: Option<String>,
    /// Key-derivation function id as understood by clients.
    pub kdf: i32,
    pub kdf_iterations: u32,
}

/// An asymmetric key pair. Both halves are opaque client strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub encrypted_private_key: String,
    pub public_key: String,
}

/// Fields needed to provision an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    pub master_password_hash: String,
    #[serde(default)]
    pub master_password_hint: Option<String>,
    pub key: String,
    #[serde(default)]
    pub keys: Option<KeyPair>,
    #[serde(default)]
    pub kdf: i32,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

fn default_kdf_iterations() -> u32 {
    600_000
}

/// How to find an account. Exactly one mode per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLookup<'a> {
    Email(&'a str),
    RefreshToken(&'a str),
}

/// Cipher type as a small integer. Unknown values are carried through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CipherType(pub i32);

impl CipherType {
    pub const LOGIN: Self = Self(1);
    pub const SECURE_NOTE: Self = Self(2);
    pub const CARD: Self = Self(3);

    #[must_use]
    pub fn is_login(self) -> bool {
        self == Self::LOGIN
    }
}

impl Default for CipherType {
    fn default() -> Self {
        Self::LOGIN
    }
}

impl fmt::Display for CipherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a login's URI list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUri {
    pub uri: Option<String>,
    #[serde(rename = "match")]
    pub match_type: Option<i32>,
}

/// The opaque payload of a cipher.
///
/// Every string here is client ciphertext. The server only ever moves these
/// values around; it never looks inside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherData {
    pub uri: Option<String>,
    pub uris: Option<Vec<LoginUri>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub fields: Option<serde_json::Value>,
    #[serde(default)]
    pub card: Option<serde_json::Value>,
    #[serde(default)]
    pub identity: Option<serde_json::Value>,
    #[serde(default)]
    pub secure_note: Option<serde_json::Value>,
}

/// A stored cipher row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherRecord {
    pub id: String,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub data: CipherData,
    pub folder_id: Option<String>,
    pub favorite: bool,
    pub revision_date: DateTime<Utc>,
}

/// A normalized cipher ready to be stored. Carries no id and no stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherDraft {
    pub cipher_type: CipherType,
    pub data: CipherData,
    pub folder_id: Option<String>,
    pub favorite: bool,
    /// The revision the client last saw, if it sent one.
    pub last_known_revision: Option<DateTime<Utc>>,
}

/// A stored folder row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub owner_id: String,
    /// Client ciphertext. Not unique.
    pub name: String,
    pub revision_date: DateTime<Utc>,
}
