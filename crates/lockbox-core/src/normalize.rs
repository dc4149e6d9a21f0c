//! Wire normalizer: inbound cipher submissions to canonical drafts.
//!
//! Clients send loosely shaped JSON where "not supplied", `null` and `""`
//! all mean the same thing. Decoding keeps every field as `Option`, and
//! [`normalize`] collapses blank strings to `None` in one place. Non-blank
//! values are kept byte for byte; the server never trims ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::DecodeError;
use crate::model::{CipherData, CipherDraft, CipherType, LoginUri};

/// A cipher as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CipherSubmission {
    #[serde(rename = "type")]
    pub cipher_type: Option<CipherType>,
    pub folder_id: Option<String>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub favorite: Option<bool>,
    pub login: Option<LoginSubmission>,
    pub fields: Option<serde_json::Value>,
    pub card: Option<serde_json::Value>,
    pub identity: Option<serde_json::Value>,
    pub secure_note: Option<serde_json::Value>,
    #[serde(deserialize_with = "blank_or_timestamp")]
    pub last_known_revision_date: Option<DateTime<Utc>>,
}

/// The login block of a submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginSubmission {
    pub uri: Option<String>,
    pub uris: Option<Vec<UriSubmission>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
}

/// One submitted URI list entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UriSubmission {
    pub uri: Option<String>,
    #[serde(rename = "match")]
    pub match_type: Option<i32>,
}

/// A folder as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderSubmission {
    pub name: String,
}

/// Decode a cipher submission.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if `body` is not a JSON object of the
/// submission shape. There is no partial recovery.
pub fn from_slice(body: &[u8]) -> Result<CipherSubmission, DecodeError> {
    decode(body, "cipher submission")
}

/// Decode a folder submission.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if `body` is not `{"name": "..."}`.
pub fn folder_from_slice(body: &[u8]) -> Result<FolderSubmission, DecodeError> {
    decode(body, "folder submission")
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    body: &[u8],
    what: &'static str,
) -> Result<T, DecodeError> {
    serde_json::from_slice(body).map_err(|source| DecodeError::Malformed { what, source })
}

/// Turn a submission into a draft ready for the record store.
///
/// Assigns no id and no revision stamp. A submission without a `type` is
/// stored as a login, the only type every client can display.
#[must_use]
pub fn normalize(submission: CipherSubmission) -> CipherDraft {
    let login = submission.login.unwrap_or_default();

    let uris = login.uris.map(|entries| {
        entries
            .into_iter()
            .map(|entry| LoginUri {
                uri: present(entry.uri),
                match_type: entry.match_type,
            })
            .collect::<Vec<_>>()
    });
    let uri = present(login.uri).or_else(|| {
        uris.as_ref()
            .and_then(|list| list.iter().find_map(|entry| entry.uri.clone()))
    });

    let data = CipherData {
        uri,
        uris: uris.filter(|list| !list.is_empty()),
        username: present(login.username),
        password: present(login.password),
        totp: present(login.totp),
        name: present(submission.name),
        notes: present(submission.notes),
        fields: submission.fields.filter(has_content),
        card: submission.card.filter(has_content),
        identity: submission.identity.filter(has_content),
        secure_note: submission.secure_note.filter(has_content),
    };

    CipherDraft {
        cipher_type: submission.cipher_type.unwrap_or_default(),
        data,
        folder_id: present(submission.folder_id),
        favorite: submission.favorite.unwrap_or(false),
        last_known_revision: submission.last_known_revision_date,
    }
}

/// `lastKnownRevisionDate` under the collapsing rule: `null` and blank
/// strings are absent, anything else must be an RFC 3339 timestamp.
fn blank_or_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    present(Option::<String>::deserialize(deserializer)?)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|stamp| stamp.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
}

/// The collapsing rule: blank after trimming means absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn has_content(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}
