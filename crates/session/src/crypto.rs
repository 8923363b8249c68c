//! Session-key crypto: key-pair generation and symmetric encryption of the
//! session private key at rest.
//!
//! The session private key never touches the database in plaintext.
//! `encrypt_private_key` derives a 256-bit AES key from the caller-supplied
//! `userSignature` via PBKDF2-HMAC-SHA256 and seals the private key with
//! AES-256-GCM. The signature itself is never persisted — only used as
//! transient KDF input — so a leaked database row is useless without it.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use alloy::signers::local::PrivateKeySigner;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::SessionError;

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// A freshly generated session key pair: the public session address and
/// the raw private-key bytes. The caller is responsible for encrypting
/// the bytes with [`encrypt_private_key`] before they leave this module.
pub struct GeneratedKeyPair {
    pub address: String,
    pub private_key: [u8; 32],
}

/// Generate a new secp256k1 key pair for a delegated session.
///
/// Bytes are drawn from `rand` directly (rather than relying on
/// `PrivateKeySigner`'s own RNG) so the raw private key is always
/// available to pass into [`encrypt_private_key`]; `PrivateKeySigner`
/// only derives the public session address from it.
pub fn generate_keypair() -> Result<GeneratedKeyPair, SessionError> {
    let mut private_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut private_key);

    let signer = PrivateKeySigner::from_slice(&private_key)
        .map_err(|e| SessionError::Crypto(format!("key generation failed: {e}")))?;
    let address = signer.address().to_string();

    Ok(GeneratedKeyPair { address, private_key })
}

/// Generate a random nonce for a delegation message, hex-encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Encrypt `private_key` under a key derived from `user_signature`.
///
/// Output layout, hex-encoded: `salt(16) || nonce(12) || ciphertext+tag`.
/// The salt and nonce are generated fresh per call so the same signature
/// never reuses a key/nonce pair across session keys.
pub fn encrypt_private_key(private_key: &[u8; 32], user_signature: &str) -> Result<String, SessionError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let key_bytes = derive_key(user_signature, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, private_key.as_slice())
        .map_err(|e| SessionError::Crypto(format!("encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);

    Ok(hex::encode(blob))
}

/// Reverse of [`encrypt_private_key`]. Fails with `SessionError::Crypto` if
/// `user_signature` is wrong (AES-GCM tag mismatch) or the blob is malformed.
pub fn decrypt_private_key(encrypted: &str, user_signature: &str) -> Result<[u8; 32], SessionError> {
    let blob = hex::decode(encrypted).map_err(|e| SessionError::Crypto(format!("malformed ciphertext: {e}")))?;
    if blob.len() < SALT_LEN + NONCE_LEN {
        return Err(SessionError::Crypto("ciphertext too short".into()));
    }

    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key_bytes = derive_key(user_signature, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| SessionError::Crypto(format!("decryption failed: {e}")))?;

    plaintext
        .try_into()
        .map_err(|_| SessionError::Crypto("decrypted key has unexpected length".into()))
}

fn derive_key(user_signature: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(user_signature.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_private_key() {
        let keypair = generate_keypair().unwrap();
        let encrypted = encrypt_private_key(&keypair.private_key, "0xsignature").unwrap();
        let decrypted = decrypt_private_key(&encrypted, "0xsignature").unwrap();
        assert_eq!(decrypted, keypair.private_key);
    }

    #[test]
    fn wrong_signature_fails_to_decrypt() {
        let keypair = generate_keypair().unwrap();
        let encrypted = encrypt_private_key(&keypair.private_key, "0xsignature").unwrap();
        assert!(decrypt_private_key(&encrypted, "0xwrong").is_err());
    }

    #[test]
    fn two_encryptions_of_the_same_key_differ() {
        let keypair = generate_keypair().unwrap();
        let a = encrypt_private_key(&keypair.private_key, "0xsignature").unwrap();
        let b = encrypt_private_key(&keypair.private_key, "0xsignature").unwrap();
        assert_ne!(a, b, "fresh salt/nonce per call must change the ciphertext");
    }

    #[test]
    fn nonce_is_hex_and_non_empty() {
        let nonce = generate_nonce();
        assert!(!nonce.is_empty());
        assert!(hex::decode(&nonce).is_ok());
    }
}
