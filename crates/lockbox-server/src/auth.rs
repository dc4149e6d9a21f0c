//! HMAC-signed bearer tokens.
//!
//! A token is `base64url(email).expiry.hex(hmac)`, where `expiry` is a Unix
//! timestamp in seconds and the HMAC-SHA256 covers `base64url(email).expiry`.
//! [`HmacGate`] verifies tokens for the vault service; [`HmacGate::issue`] is
//! what a login flow calls to mint them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use lockbox_core::{IdentityError, IdentityGate};

type HmacSha256 = Hmac<Sha256>;

/// Verifies bearer tokens signed with a shared secret.
#[derive(Clone)]
pub struct HmacGate {
    secret: Vec<u8>,
}

impl std::fmt::Debug for HmacGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacGate")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn invalid(reason: &str) -> IdentityError {
    IdentityError::InvalidCredential {
        reason: reason.to_owned(),
    }
}

impl HmacGate {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// A gate with a random per-process secret. Tokens stop verifying when
    /// the process restarts.
    #[must_use]
    pub fn ephemeral() -> Self {
        // Two UUID v4s = 32 bytes of OS CSPRNG randomness.
        let mut secret = Vec::with_capacity(32);
        secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self { secret }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, IdentityError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| invalid(&format!("unusable signing secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Mint a token for `email` that is valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredential`] if the signing secret is
    /// unusable.
    pub fn issue(&self, email: &str, ttl: TimeDelta) -> Result<String, IdentityError> {
        let expiry = (Utc::now() + ttl).timestamp();
        let payload = format!("{}.{expiry}", URL_SAFE_NO_PAD.encode(email));
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }
}

#[async_trait::async_trait]
impl IdentityGate for HmacGate {
    async fn resolve(&self, credential: &str) -> Result<String, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }

        let (payload, signature) = credential
            .rsplit_once('.')
            .ok_or_else(|| invalid("malformed token"))?;
        let (encoded_email, expiry) = payload
            .split_once('.')
            .ok_or_else(|| invalid("malformed token"))?;

        let signature = hex::decode(signature).map_err(|_| invalid("malformed signature"))?;
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| invalid("bad signature"))?;

        let expiry: i64 = expiry.parse().map_err(|_| invalid("malformed expiry"))?;
        if Utc::now().timestamp() >= expiry {
            return Err(IdentityError::Expired);
        }

        let email = URL_SAFE_NO_PAD
            .decode(encoded_email)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| invalid("malformed subject"))?;
        Ok(email)
    }
}
