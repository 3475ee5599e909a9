//! AES-128-GCM encryption for cluster credentials.
//!
//! Wire/rest format: `base64(nonce(12 bytes) || ciphertext_and_tag)`. The
//! key is 32 hex characters (16 bytes) from the environment; governance and
//! executor must be configured with the same key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption key must be {} hex characters", KEY_LEN * 2)]
    BadKeyLength,

    #[error("Encryption key is not valid hex: {0}")]
    BadKeyEncoding(#[from] hex::FromHexError),

    #[error("Ciphertext is not valid base64: {0}")]
    BadCiphertextEncoding(#[from] base64::DecodeError),

    #[error("Ciphertext too short")]
    TruncatedCiphertext,

    #[error("Decryption failed (wrong key or tampered ciphertext)")]
    DecryptionFailed,

    #[error("Decrypted secret is not valid UTF-8")]
    NotUtf8,
}

/// Symmetric secret box over string secrets.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes128Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.write_str("SecretBox")
    }
}

impl SecretBox {
    /// Build from a 32-hex-character key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())?;
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::BadKeyLength);
        }
        let key = Key::<Aes128Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes128Gcm::new(key),
        })
    }

    /// Encrypt a secret with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let mut buf = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(buf))
    }

    /// Decrypt a secret produced by [`Self::encrypt`].
    ///
    /// Failure here is fatal for whatever operation required the secret.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let data = BASE64.decode(encoded)?;
        if data.len() <= NONCE_LEN {
            return Err(CryptoError::TruncatedCiphertext);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_round_trip() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        let ct = sb.encrypt("ch-admin-password").unwrap();
        assert_ne!(ct, "ch-admin-password");
        assert_eq!(sb.decrypt(&ct).unwrap(), "ch-admin-password");
    }

    #[test]
    fn test_nonce_varies_per_encryption() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        assert_ne!(sb.encrypt("x").unwrap(), sb.encrypt("x").unwrap());
    }

    #[test]
    fn test_empty_secret() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        let ct = sb.encrypt("").unwrap();
        assert_eq!(sb.decrypt(&ct).unwrap(), "");
    }

    #[test]
    fn test_bad_key() {
        assert!(matches!(
            SecretBox::from_hex_key("deadbeef"),
            Err(CryptoError::BadKeyLength)
        ));
        assert!(SecretBox::from_hex_key("zz123456789abcdef0123456789abcde").is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        let other = SecretBox::from_hex_key("ffffffffffffffffffffffffffffffff").unwrap();
        let ct = sb.encrypt("secret").unwrap();
        assert!(matches!(other.decrypt(&ct), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        let ct = sb.encrypt("secret").unwrap();
        let mut raw = BASE64.decode(&ct).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);
        assert!(matches!(sb.decrypt(&tampered), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_garbage_inputs() {
        let sb = SecretBox::from_hex_key(KEY).unwrap();
        assert!(sb.decrypt("not base64 !!!").is_err());
        assert!(matches!(
            sb.decrypt("AAAA"),
            Err(CryptoError::TruncatedCiphertext)
        ));
    }
}
