//! Random identifiers and the one-way hash used to store bearer tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Namespace marker carried by every issued bearer token.
pub const TOKEN_PREFIX: &str = "broker.";

const SESSION_ID_BYTES: usize = 32;
const STATE_BYTES: usize = 24;
const CODE_BYTES: usize = 32;
const TOKEN_BYTES: usize = 32;

/// Source of randomness and storage hashing.
///
/// Injected into the flow so tests can substitute deterministic values.
pub trait SecretCodec: Send + Sync {
    /// `byte_len` bytes from a cryptographically secure source, URL-safe encoded.
    fn generate_random(&self, byte_len: usize) -> String;

    /// Deterministic one-way digest of `token`, URL-safe encoded.
    fn hash_for_storage(&self, token: &str) -> String;

    fn generate_session_id(&self) -> String {
        self.generate_random(SESSION_ID_BYTES)
    }

    fn generate_state(&self) -> String {
        self.generate_random(STATE_BYTES)
    }

    fn generate_code(&self) -> String {
        self.generate_random(CODE_BYTES)
    }

    fn generate_token(&self) -> String {
        format!("{TOKEN_PREFIX}{}", self.generate_random(TOKEN_BYTES))
    }
}

/// Codec backed by the operating system CSPRNG and SHA-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSecretCodec;

impl SecretCodec for OsSecretCodec {
    fn generate_random(&self, byte_len: usize) -> String {
        let mut bytes = vec![0u8; byte_len];
        // Continuing without entropy would hand out guessable identifiers.
        getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn hash_for_storage(&self, token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_values_have_expected_length_and_alphabet() {
        let codec = OsSecretCodec;
        let value = codec.generate_random(32);
        // 32 bytes -> 43 unpadded base64 characters
        assert_eq!(value.len(), 43);
        assert!(
            value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(codec.generate_state().len(), 32);
    }

    #[test]
    fn random_values_do_not_repeat() {
        let codec = OsSecretCodec;
        let values: HashSet<String> = (0..256).map(|_| codec.generate_code()).collect();
        assert_eq!(values.len(), 256);
    }

    #[test]
    fn only_tokens_carry_the_prefix() {
        let codec = OsSecretCodec;
        assert!(codec.generate_token().starts_with(TOKEN_PREFIX));
        assert!(!codec.generate_session_id().starts_with(TOKEN_PREFIX));
        assert!(!codec.generate_code().starts_with(TOKEN_PREFIX));
    }

    #[test]
    fn storage_hash_is_deterministic_sha256() {
        let codec = OsSecretCodec;
        let a = codec.hash_for_storage("broker.abc");
        let b = codec.hash_for_storage("broker.abc");
        assert_eq!(a, b);
        assert_ne!(a, codec.hash_for_storage("broker.abd"));
        assert_eq!(a.len(), 43);
        // sha256("") in unpadded url-safe base64
        assert_eq!(
            codec.hash_for_storage(""),
            "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU"
        );
    }
}
