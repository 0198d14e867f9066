//! Cryptographically secure random bytes for keys and nonces.

use aes_gcm::aead::{rand_core::RngCore, OsRng};

use common::EnvelopeError;

/// Source of cryptographically secure random bytes.
///
/// Production code uses [`OsRandom`]. Tests inject deterministic sources to
/// pin down DEK and nonce values.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EntropyUnavailable`] if the generator cannot
    /// supply the bytes. Callers must treat this as fatal.
    fn fill(&self, dest: &mut [u8]) -> Result<(), EnvelopeError>;

    /// Return `n` random bytes.
    fn bytes(&self, n: usize) -> Result<Vec<u8>, EnvelopeError> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), EnvelopeError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| EnvelopeError::EntropyUnavailable(e.to_string()))
    }
}
