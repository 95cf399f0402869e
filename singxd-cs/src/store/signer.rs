//! HMAC-signed download URLs for artifacts served by this process
//!
//! Used by the `local` and `memory` backends, which have no native presigning.
//! URL form:
//!
//! ```text
//! <base>/artifacts/<key>?expires=<unix-seconds>&signature=<base64url(HMAC-SHA256(secret, "<key>\n<expires>"))>
//! ```

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Why a signed URL was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is malformed")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
    #[error("link expired")]
    Expired,
}

#[derive(Clone)]
pub struct LocalUrlSigner {
    mac: HmacSha256,
    base_url: String,
}

impl std::fmt::Debug for LocalUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("LocalUrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LocalUrlSigner {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Result<Self, StoreError> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| StoreError::Configuration(format!("signing secret: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { mac, base_url })
    }

    /// Signed URL for `key`, valid for `ttl` from now
    pub fn sign_url(&self, key: &str, ttl: Duration) -> String {
        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        self.sign_url_until(key, expires)
    }

    /// Signed URL for `key`, valid until the unix timestamp `expires`
    pub fn sign_url_until(&self, key: &str, expires: i64) -> String {
        format!(
            "{}/artifacts/{}?expires={}&signature={}",
            self.base_url,
            key,
            expires,
            self.signature(key, expires)
        )
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.digest(key, expires).finalize().into_bytes())
    }

    fn digest(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Check a signature and its deadline against the current time
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), SignatureError> {
        self.verify_at(key, expires, signature, chrono::Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Malformed)?;
        self.digest(key, expires)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)?;
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}
