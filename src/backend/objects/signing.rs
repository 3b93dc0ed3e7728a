/**
 * Signed Download URLs
 *
 * A download URL carries the object key, an expiry (unix seconds) and an
 * HMAC-SHA256 over both:
 *
 * ```text
 * {base}/files/download/{key}?expires={unix}&signature={hex}
 * ```
 *
 * The download handler recomputes the MAC, so no URL state is stored.
 */

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Route prefix the download handler is mounted on
pub const DOWNLOAD_PATH: &str = "/files/download";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("download link expired")]
    Expired,
    #[error("download link signature is invalid")]
    Invalid,
    #[error("signing key rejected")]
    InvalidKey,
}

#[derive(Clone)]
pub struct UrlSigner {
    /// Keyed MAC, cloned for every signature
    keyed: HmacSha256,
    public_base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(key: impl AsRef<[u8]>, public_base_url: &str) -> Result<Self, SignatureError> {
        let keyed = HmacSha256::new_from_slice(key.as_ref()).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self {
            keyed,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex signature for `key` valid until `expires`
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Full download URL valid for `ttl` from now
    pub fn signed_url(&self, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        format!(
            "{}{}/{}?expires={}&signature={}",
            self.public_base_url,
            DOWNLOAD_PATH,
            encode_path(key),
            expires,
            self.sign(key, expires)
        )
    }

    /// Check a signature at the current time
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), SignatureError> {
        self.verify_at(key, expires, signature, Utc::now().timestamp())
    }

    pub fn verify_at(&self, key: &str, expires: i64, signature: &str, now: i64) -> Result<(), SignatureError> {
        let provided = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(key, expires)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Invalid)?;
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

/// Percent-encode a key for use as a URL path, keeping `/` separators
pub fn encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
