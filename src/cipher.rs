//! Field Cipher
//!
//! Authenticated encryption of individual string fields (the password field
//! in practice) with ChaCha20-Poly1305. Each call uses a fresh random nonce
//! which is prepended to the sealed bytes; the whole token is base64-encoded
//! so it can sit on a single line of the config file.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

/// Nonce length for ChaCha20-Poly1305
pub const NONCE_LEN: usize = 12;

/// Minimum length for a field value to be classified as ciphertext
const MIN_CIPHERTEXT_LEN: usize = 20;

/// Cipher errors
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key is not initialized")]
    KeyNotInitialized,

    #[error("Cryptographic error")]
    Crypto,

    #[error("Decryption failed (wrong key or corrupted data)")]
    Decrypt,
}

/// Stateless field cipher, keyed by the derived master key.
pub struct FieldCipher {
    key: Option<Zeroizing<[u8; 32]>>,
}

impl FieldCipher {
    /// Cipher with no key bound; encrypt/decrypt will fail until one is.
    pub fn uninitialized() -> Self {
        Self { key: None }
    }

    pub fn with_key(key: Zeroizing<[u8; 32]>) -> Self {
        Self { key: Some(key) }
    }

    /// Bind (or replace) the encryption key.
    pub fn bind_key(&mut self, key: Zeroizing<[u8; 32]>) {
        self.key = Some(key);
    }

    /// Whether a key is currently bound.
    pub fn is_initialized(&self) -> bool {
        self.key.is_some()
    }

    fn aead(&self) -> Result<ChaCha20Poly1305, CipherError> {
        let key = self.key.as_ref().ok_or(CipherError::KeyNotInitialized)?;
        ChaCha20Poly1305::new_from_slice(&**key).map_err(|_| CipherError::Crypto)
    }

    /// Encrypt a field value. Empty input yields empty output.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let aead = self.aead()?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let sealed = aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CipherError::Crypto)?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);

        Ok(BASE64.encode(token))
    }

    /// Decrypt a field token. Empty input yields empty output.
    pub fn decrypt(&self, token: &str) -> Result<String, CipherError> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let aead = self.aead()?;

        let data = BASE64.decode(token).map_err(|_| CipherError::Decrypt)?;
        if data.len() < NONCE_LEN {
            return Err(CipherError::Decrypt);
        }

        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let plaintext = aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}

/// Guess whether a field value is already ciphertext: at least 20 characters,
/// all from the base64 alphabet.
///
/// Known limitation: a 20+-character alphanumeric plaintext password is
/// misclassified as encrypted. Tolerated so files mixing encrypted and
/// freshly imported plaintext passwords survive import without
/// double-encryption.
pub fn looks_encrypted(value: &str) -> bool {
    value.len() >= MIN_CIPHERTEXT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::with_key(Zeroizing::new([7u8; 32]))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();

        let token = cipher.encrypt("s3cret-p@ssword").unwrap();
        assert_ne!(token, "s3cret-p@ssword");

        let plaintext = cipher.decrypt(&token).unwrap();
        assert_eq!(plaintext, "s3cret-p@ssword");
    }

    #[test]
    fn test_empty_is_noop() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_nonce_freshness() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same input").unwrap();
        let b = cipher.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tamper_detection() {
        let cipher = test_cipher();
        let token = cipher.encrypt("payload").unwrap();
        let mut raw = BASE64.decode(&token).unwrap();

        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let tampered = BASE64.encode(&raw);
            assert!(matches!(
                cipher.decrypt(&tampered),
                Err(CipherError::Decrypt)
            ));
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher = test_cipher();
        let other = FieldCipher::with_key(Zeroizing::new([8u8; 32]));

        let token = cipher.encrypt("payload").unwrap();
        assert!(matches!(other.decrypt(&token), Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let cipher = test_cipher();

        // Not base64
        assert!(matches!(
            cipher.decrypt("!!! not base64 !!!"),
            Err(CipherError::Decrypt)
        ));

        // Shorter than the nonce
        let short = BASE64.encode([0u8; NONCE_LEN - 1]);
        assert!(matches!(cipher.decrypt(&short), Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_uninitialized_cipher() {
        let cipher = FieldCipher::uninitialized();
        assert!(!cipher.is_initialized());
        assert!(matches!(
            cipher.encrypt("anything"),
            Err(CipherError::KeyNotInitialized)
        ));
    }

    #[test]
    fn test_looks_encrypted() {
        let cipher = test_cipher();
        let token = cipher.encrypt("some password").unwrap();
        assert!(looks_encrypted(&token));

        assert!(!looks_encrypted("short"));
        assert!(!looks_encrypted("has spaces but is quite long"));
        assert!(!looks_encrypted("p@ssword-with-symbols!!"));

        // Documented misclassification: long alphanumeric plaintext
        assert!(looks_encrypted("abcdefghij0123456789"));
    }
}
