//! [`DataEncryptionKey`]: in-memory holder for a single-use AES-256 key.

use zeroize::{Zeroize, ZeroizeOnDrop};

use common::EnvelopeError;

use crate::crypto::KEY_LEN;
use crate::rng::RandomSource;

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// One key is generated per encrypt call, or recovered from the KMS per
/// decrypt attempt, and is dropped at the end of that call. The memory is
/// overwritten with zeroes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataEncryptionKey([u8; KEY_LEN]);

impl DataEncryptionKey {
    /// Generate a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EntropyUnavailable`] if `rng` fails.
    pub fn generate(rng: &dyn RandomSource) -> Result<Self, EnvelopeError> {
        let mut key = Self([0u8; KEY_LEN]);
        rng.fill(&mut key.0)?;
        Ok(key)
    }

    /// Copy unwrapped key material into a new key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidKeyMaterial`] if `bytes` is not exactly
    /// [`KEY_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() != KEY_LEN {
            return Err(EnvelopeError::InvalidKeyMaterial(format!(
                "unwrapped key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Self([0u8; KEY_LEN]);
        key.0.copy_from_slice(bytes);
        Ok(key)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DataEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("DataEncryptionKey([REDACTED])")
    }
}
