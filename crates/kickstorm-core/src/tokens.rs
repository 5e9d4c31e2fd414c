//! Signed tokens for short-lived file downloads.
//!
//! Payload: issued_at (u64 BE) || project_id (i64 BE) || path bytes.
//! Token = base64url(payload || HMAC-SHA256(secret, salt || payload)).
//!
//! Tokens are single-purpose read capabilities binding one project and one
//! sanitized path. They carry no user identity; authorization happens at
//! issuance time, which is gated by project membership.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const HEADER_LEN: usize = 8 + 8; // issued_at + project_id
const MAC_LEN: usize = 32; // SHA256

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("file token has expired")]
    Expired,
    #[error("file token is invalid")]
    Invalid,
}

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub project_id: i64,
    pub path: String,
    pub issued_at: u64,
}

/// Build a signed download token for one project file. The path must already
/// be sanitized.
pub fn sign(project_id: i64, path: &str, secret: &[u8], salt: &str) -> String {
    let issued_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut payload = Vec::with_capacity(HEADER_LEN + path.len());
    payload.extend_from_slice(&issued_at.to_be_bytes());
    payload.extend_from_slice(&project_id.to_be_bytes());
    payload.extend_from_slice(path.as_bytes());

    let tag = compute_tag(secret, salt, &payload);

    let mut token_bytes = payload;
    token_bytes.extend_from_slice(&tag);

    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Verify a token's signature and age, returning the bound payload.
pub fn verify(
    token: &str,
    secret: &[u8],
    salt: &str,
    max_age: Duration,
) -> Result<TokenPayload, TokenError> {
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| TokenError::Invalid)?;
    if decoded.len() < HEADER_LEN + MAC_LEN {
        return Err(TokenError::Invalid);
    }

    let (payload, tag) = decoded.split_at(decoded.len() - MAC_LEN);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(salt.as_bytes());
    mac.update(payload);
    mac.verify_slice(tag).map_err(|_| TokenError::Invalid)?;

    let issued_at = u64::from_be_bytes(payload[0..8].try_into().map_err(|_| TokenError::Invalid)?);
    let project_id =
        i64::from_be_bytes(payload[8..16].try_into().map_err(|_| TokenError::Invalid)?);
    let path = std::str::from_utf8(&payload[HEADER_LEN..])
        .map_err(|_| TokenError::Invalid)?
        .to_string();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    // Tokens from the future are tampered clocks, not fresh tokens.
    if issued_at > now {
        return Err(TokenError::Invalid);
    }
    if now - issued_at > max_age.as_secs() {
        return Err(TokenError::Expired);
    }

    Ok(TokenPayload {
        project_id,
        path,
        issued_at,
    })
}

fn compute_tag(secret: &[u8], salt: &str, payload: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(salt.as_bytes());
    mac.update(payload);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-key-for-file-tokens";
    const SALT: &str = "workspace-file-token";

    #[test]
    fn test_round_trip() {
        let token = sign(42, "src/main.rs", SECRET, SALT);
        let payload = verify(&token, SECRET, SALT, Duration::from_secs(300)).unwrap();
        assert_eq!(payload.project_id, 42);
        assert_eq!(payload.path, "src/main.rs");
    }

    #[test]
    fn test_round_trip_negative_project_id() {
        let token = sign(-7, "a.txt", SECRET, SALT);
        let payload = verify(&token, SECRET, SALT, Duration::from_secs(300)).unwrap();
        assert_eq!(payload.project_id, -7);
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let token = sign(1, "a.txt", SECRET, SALT);
        let mut bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&token)
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert_eq!(
            verify(&tampered, SECRET, SALT, Duration::from_secs(300)),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = sign(1, "a.txt", SECRET, SALT);
        assert_eq!(
            verify(&token, b"another-secret-entirely-here", SALT, Duration::from_secs(300)),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_wrong_salt_is_invalid() {
        let token = sign(1, "a.txt", SECRET, SALT);
        assert_eq!(
            verify(&token, SECRET, "other-salt", Duration::from_secs(300)),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_expired_token() {
        // Hand-build a token issued 10 minutes in the past.
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 600;
        let mut payload = Vec::new();
        payload.extend_from_slice(&issued_at.to_be_bytes());
        payload.extend_from_slice(&1i64.to_be_bytes());
        payload.extend_from_slice(b"a.txt");
        let tag = compute_tag(SECRET, SALT, &payload);
        let mut token_bytes = payload;
        token_bytes.extend_from_slice(&tag);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes);

        assert_eq!(
            verify(&token, SECRET, SALT, Duration::from_secs(300)),
            Err(TokenError::Expired)
        );
        // Still within a generous max age.
        assert!(verify(&token, SECRET, SALT, Duration::from_secs(3600)).is_ok());
    }

    #[test]
    fn test_garbage_tokens_are_invalid() {
        for junk in ["", "x", "not-base64!!!", "AAAA"] {
            assert_eq!(
                verify(junk, SECRET, SALT, Duration::from_secs(300)),
                Err(TokenError::Invalid)
            );
        }
    }
}
