//! Generation and hashing of bearer secrets (API keys and session tokens).
//!
//! Only SHA-256 hashes are persisted; the raw secret is returned once at
//! creation time.

use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Default API key prefix
pub const DEFAULT_API_KEY_PREFIX: &str = "gw_live_";

/// Prefix of opaque session tokens.
pub const SESSION_TOKEN_PREFIX: &str = "gw_sess_";

/// Generate a new secret with the given prefix.
///
/// Returns `(raw_secret, secret_hash)`; store the hash, hand out the raw value.
pub fn generate_secret_with_prefix(prefix: &str) -> (String, String) {
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 32];
    rng.fill(&mut random_bytes);

    let random_part = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let raw = format!("{}{}", prefix, random_part);
    let hash = hash_secret(&raw);

    (raw, hash)
}

/// Generate a new session token.
pub fn generate_session_token() -> (String, String) {
    generate_secret_with_prefix(SESSION_TOKEN_PREFIX)
}

/// Hex-encoded SHA-256 of a raw secret.
pub fn hash_secret(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time check that `raw` hashes to `stored_hash`.
pub fn verify_secret(raw: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(raw);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Constant-time prefix check.
pub fn has_valid_prefix(key: &str, expected_prefix: &str) -> bool {
    let Some(key_prefix) = key.as_bytes().get(..expected_prefix.len()) else {
        return false;
    };
    key_prefix.ct_eq(expected_prefix.as_bytes()).into()
}

/// Constant-time equality of two secrets of possibly different lengths.
pub fn secrets_equal(presented: &str, expected: &str) -> bool {
    // Compare digests so the comparison time does not depend on length.
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.ct_eq(&b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_valid_prefix() {
        assert!(has_valid_prefix("gw_live_abcd123", "gw_live_"));
        assert!(has_valid_prefix("gw_live_", "gw_live_"));

        assert!(!has_valid_prefix("invalid_key", "gw_live_"));
        assert!(!has_valid_prefix("gw_live", "gw_live_"));
        assert!(!has_valid_prefix("", "gw_live_"));
        assert!(!has_valid_prefix("gw_sess_abc", "gw_live_"));
    }

    #[test]
    fn test_has_valid_prefix_multibyte() {
        // Byte-wise slicing must not panic on a char boundary.
        assert!(!has_valid_prefix("é", "gw_live_"));
        assert!(!has_valid_prefix("gw_livé_x", "gw_live_"));
    }

    #[test]
    fn test_generate_secret_format() {
        let (raw, hash) = generate_secret_with_prefix(DEFAULT_API_KEY_PREFIX);
        assert!(raw.starts_with(DEFAULT_API_KEY_PREFIX));
        // 32 bytes in base64 without padding is 43 characters
        assert_eq!(raw.len(), DEFAULT_API_KEY_PREFIX.len() + 43);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_secret(&raw));
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let (a, _) = generate_session_token();
        let (b, _) = generate_session_token();
        assert_ne!(a, b);
        assert!(a.starts_with(SESSION_TOKEN_PREFIX));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_secret("gw_live_x"), hash_secret("gw_live_x"));
        assert_ne!(hash_secret("gw_live_x"), hash_secret("gw_live_y"));
    }

    #[test]
    fn test_verify_secret() {
        let (raw, hash) = generate_secret_with_prefix("t_");
        assert!(verify_secret(&raw, &hash));
        assert!(!verify_secret("t_wrong", &hash));
    }

    #[test]
    fn test_secrets_equal() {
        assert!(secrets_equal("sk-master", "sk-master"));
        assert!(!secrets_equal("sk-master", "sk-master2"));
        assert!(!secrets_equal("", "sk-master"));
    }
}
