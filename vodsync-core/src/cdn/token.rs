use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing key must not be empty")]
    EmptyKey,
}

/// Deterministic HMAC signer for time-limited CDN URLs. Same inputs
/// always yield the same token string.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        if key.is_empty() {
            return Err(TokenError::EmptyKey);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| TokenError::EmptyKey)?;
        Ok(Self { mac })
    }

    /// Signs the path component only; any query string is stripped first.
    /// Output is `"{expires}_{base64url-digest}"`, appended to signed URLs
    /// as a query parameter.
    pub fn sign(&self, path: &str, expires_at_unix: i64) -> String {
        let path = path.split('?').next().unwrap_or(path);
        let mut mac = self.mac.clone();
        mac.update(expires_at_unix.to_string().as_bytes());
        mac.update(path.as_bytes());
        let digest = mac.finalize().into_bytes();
        format!("{}_{}", expires_at_unix, URL_SAFE_NO_PAD.encode(digest))
    }

    /// Splits a token back into its expiry prefix and digest part.
    pub fn parse(token: &str) -> Option<(i64, &str)> {
        let (expires, digest) = token.split_once('_')?;
        let expires = expires.parse::<i64>().ok()?;
        if digest.is_empty() {
            return None;
        }
        Some((expires, digest))
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(TokenSigner::new(b"").is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = TokenSigner::new(b"secret").unwrap();
        let a = signer.sign("/abc/playlist.m3u8", 1_900_000_000);
        let b = signer.sign("/abc/playlist.m3u8", 1_900_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn any_input_change_alters_the_token() {
        let signer = TokenSigner::new(b"secret").unwrap();
        let base = signer.sign("/abc/playlist.m3u8", 1_900_000_000);
        assert_ne!(base, signer.sign("/abc/playlist.m3u8", 1_900_000_001));
        assert_ne!(base, signer.sign("/xyz/playlist.m3u8", 1_900_000_000));
        let other = TokenSigner::new(b"other-secret").unwrap();
        assert_ne!(base, other.sign("/abc/playlist.m3u8", 1_900_000_000));
    }

    #[test]
    fn query_string_is_stripped_before_signing() {
        let signer = TokenSigner::new(b"secret").unwrap();
        assert_eq!(
            signer.sign("/abc/playlist.m3u8", 1_900_000_000),
            signer.sign("/abc/playlist.m3u8?cached=1", 1_900_000_000)
        );
    }

    #[test]
    fn token_round_trips_its_expiry() {
        let signer = TokenSigner::new(b"secret").unwrap();
        let token = signer.sign("/abc/playlist.m3u8", 1_900_000_000);
        let (expires, digest) = TokenSigner::parse(&token).unwrap();
        assert_eq!(expires, 1_900_000_000);
        assert!(!digest.is_empty());
    }
}
