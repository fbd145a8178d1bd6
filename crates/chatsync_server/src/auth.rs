//! API key authentication.
//!
//! Keys are HMAC-SHA256 signatures over the user id, so the server can
//! validate them without storing anything.
//!
//! ## Key Format
//!
//! `<user_id>:<signature>`, where the signature is the lowercase hex
//! encoding of `HMAC-SHA256(secret, user_id as 8 big-endian bytes)`.

use crate::error::{ServerError, ServerResult};
use chatsync_protocol::UserId;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write;

type HmacSha256 = Hmac<Sha256>;

/// Issues and validates API keys.
#[derive(Clone)]
pub struct ApiKeyValidator {
    secret: Vec<u8>,
}

impl ApiKeyValidator {
    /// Creates a validator for the given secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Creates an API key for a user.
    pub fn create_key(&self, user_id: UserId) -> String {
        format!("{user_id}:{}", hex(&self.sign(user_id)))
    }

    /// Validates a key and returns the user it belongs to.
    pub fn validate(&self, key: &str) -> ServerResult<UserId> {
        let (user, signature) = key
            .split_once(':')
            .ok_or_else(|| ServerError::AuthenticationFailed("Malformed API key".into()))?;
        let user_id: UserId = user
            .parse()
            .map_err(|_| ServerError::AuthenticationFailed("Malformed API key".into()))?;

        let mut mac = self.mac()?;
        mac.update(&user_id.to_be_bytes());
        let expected = mac.finalize().into_bytes();
        if hex(&expected) != signature {
            return Err(ServerError::NotAuthorized("Invalid API key".into()));
        }
        Ok(user_id)
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("bad HMAC key: {e}")))
    }

    fn sign(&self, user_id: UserId) -> Vec<u8> {
        match self.mac() {
            Ok(mut mac) => {
                mac.update(&user_id.to_be_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        }
    }
}

impl std::fmt::Debug for ApiKeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyValidator").finish_non_exhaustive()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ApiKeyValidator {
        ApiKeyValidator::new(b"test-secret-key-32-bytes-long!!".to_vec())
    }

    #[test]
    fn create_and_validate_key() {
        let validator = validator();
        let key = validator.create_key(42);
        assert!(key.starts_with("42:"));
        assert_eq!(key.len(), 3 + 64);
        assert_eq!(validator.validate(&key), Ok(42));
    }

    #[test]
    fn reject_key_for_other_user() {
        let validator = validator();
        let key = validator.create_key(42);
        let forged = key.replacen("42:", "43:", 1);
        assert!(matches!(
            validator.validate(&forged),
            Err(ServerError::NotAuthorized(_))
        ));
    }

    #[test]
    fn reject_key_from_other_secret() {
        let other = ApiKeyValidator::new(b"another-secret".to_vec());
        let key = other.create_key(1);
        assert!(validator().validate(&key).is_err());
    }

    #[test]
    fn reject_malformed_key() {
        assert!(matches!(
            validator().validate("not-a-key"),
            Err(ServerError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            validator().validate("abc:ff"),
            Err(ServerError::AuthenticationFailed(_))
        ));
    }
}
