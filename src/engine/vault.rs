use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use crate::{Result, Error};

/// Length in bytes of an AES-256 key.
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts a plaintext string using AES-256-GCM and a 32-byte key.
///
/// Returns a hex-encoded string containing the nonce followed by the ciphertext.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher_for(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| Error::Crypto(e.to_string()))?;

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(hex::encode(combined))
}

/// Decrypts the output of [`encrypt`] with the same key.
pub fn decrypt(cipher_hex: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher_for(key)?;
    let combined = hex::decode(cipher_hex).map_err(|e| Error::Crypto(e.to_string()))?;
    if combined.len() < NONCE_LEN {
        return Err(Error::Crypto("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| Error::Crypto("decryption failed (wrong key or tampered data)".to_string()))?;
    String::from_utf8(plaintext_bytes).map_err(|e| Error::Crypto(e.to_string()))
}

/// Parses a 64-character hex string into a 32-byte key.
pub fn parse_key(key_hex: &str) -> Result<Vec<u8>> {
    let key = hex::decode(key_hex.trim()).map_err(|e| Error::Crypto(format!("master key is not hex: {}", e)))?;
    if key.len() != KEY_LEN {
        return Err(Error::Crypto(format!("master key must be {} bytes, got {}", KEY_LEN, key.len())));
    }
    Ok(key)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(Error::Crypto("Key must be 32 bytes".to_string()));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = b"thisis32byteslongsecretkey123456";
        let plaintext = "robot-api-token";
        let ciphertext = encrypt(plaintext, key).unwrap();
        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt(&ciphertext, key).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let key1 = b"thisis32byteslongsecretkey123456";
        let key2 = b"another32byteslongsecretkey65432";
        let ciphertext = encrypt("Secret message", key1).unwrap();
        assert!(matches!(decrypt(&ciphertext, key2), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(encrypt("x", b"short").is_err());
    }

    #[test]
    fn test_parse_key() {
        let hex_key = "00".repeat(32);
        assert_eq!(parse_key(&hex_key).unwrap(), vec![0u8; 32]);
        assert!(parse_key("abcd").is_err());
        assert!(parse_key("zz").is_err());
    }
}
