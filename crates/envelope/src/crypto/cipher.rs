//! AES-256-GCM seal and open over a single-use data encryption key.
//!
//! Every encrypt operation generates a fresh DEK and a fresh nonce, so a
//! (key, nonce) pair is never sealed twice. Nothing here chooses nonces on
//! behalf of a long-lived key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use common::EnvelopeError;

use crate::rng::RandomSource;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Generate a fresh random nonce.
///
/// # Errors
///
/// Returns [`EnvelopeError::EntropyUnavailable`] if `rng` fails.
pub fn generate_nonce(rng: &dyn RandomSource) -> Result<[u8; NONCE_LEN], EnvelopeError> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce)?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key` and `nonce`, authenticating `aad` alongside it.
///
/// The returned ciphertext is `plaintext.len() + TAG_LEN` bytes.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyMaterial`] if `key` is not [`KEY_LEN`]
/// bytes or `nonce` is not [`NONCE_LEN`] bytes.
pub fn seal(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = build_cipher(key)?;
    check_nonce_len(nonce)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| {
            EnvelopeError::InvalidKeyMaterial("AES-GCM refused to seal the payload".into())
        })
}

/// Decrypt and verify a ciphertext produced by [`seal`].
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyMaterial`] for a wrongly sized key or
/// nonce, and [`EnvelopeError::AuthenticationFailed`] if the tag does not
/// verify (wrong key, wrong nonce, or tampered data).
pub fn open(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = build_cipher(key)?;
    check_nonce_len(nonce)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| EnvelopeError::AuthenticationFailed)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, EnvelopeError> {
    if key.len() != KEY_LEN {
        return Err(EnvelopeError::InvalidKeyMaterial(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| EnvelopeError::InvalidKeyMaterial(format!("key must be {KEY_LEN} bytes")))
}

// `Nonce::from_slice` panics on a wrong length, so check first.
fn check_nonce_len(nonce: &[u8]) -> Result<(), EnvelopeError> {
    if nonce.len() != NONCE_LEN {
        return Err(EnvelopeError::InvalidKeyMaterial(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::OsRandom;

    fn random_key() -> Vec<u8> {
        OsRandom.bytes(KEY_LEN).unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let key = random_key();
        let nonce = generate_nonce(&OsRandom).unwrap();
        let ciphertext = seal(&key, &nonce, b"123-45-6789", b"").unwrap();
        assert_eq!(ciphertext.len(), 11 + TAG_LEN);
        let plaintext = open(&key, &nonce, &ciphertext, b"").unwrap();
        assert_eq!(plaintext, b"123-45-6789");
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = random_key();
        let nonce = [0u8; NONCE_LEN];
        let ciphertext = seal(&key, &nonce, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_LEN);
        assert!(open(&key, &nonce, &ciphertext, b"").unwrap().is_empty());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let nonce = [7u8; NONCE_LEN];
        let ciphertext = seal(&random_key(), &nonce, b"secret", b"").unwrap();
        let err = open(&random_key(), &nonce, &ciphertext, b"").unwrap_err();
        assert!(matches!(err, EnvelopeError::AuthenticationFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = random_key();
        let nonce = [1u8; NONCE_LEN];
        let mut ciphertext = seal(&key, &nonce, b"tamper me", b"").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            open(&key, &nonce, &ciphertext, b""),
            Err(EnvelopeError::AuthenticationFailed)
        ));
    }

    #[test]
    fn associated_data_is_authenticated() {
        let key = random_key();
        let nonce = [2u8; NONCE_LEN];
        let ciphertext = seal(&key, &nonce, b"payload", b"context-a").unwrap();
        assert!(open(&key, &nonce, &ciphertext, b"context-b").is_err());
        assert_eq!(
            open(&key, &nonce, &ciphertext, b"context-a").unwrap(),
            b"payload"
        );
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let key = random_key();
        let nonce = [3u8; NONCE_LEN];
        assert!(matches!(
            open(&key, &nonce, &[0u8; 5], b""),
            Err(EnvelopeError::AuthenticationFailed)
        ));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let err = seal(&[0u8; 16], &[0u8; NONCE_LEN], b"x", b"").unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidKeyMaterial(_)));
        let err = open(&[0u8; 33], &[0u8; NONCE_LEN], b"x", b"").unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn invalid_nonce_length_rejected() {
        let key = random_key();
        let err = seal(&key, &[0u8; 11], b"x", b"").unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidKeyMaterial(_)));
        let err = open(&key, &[0u8; 16], b"x", b"").unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidKeyMaterial(_)));
    }
}
