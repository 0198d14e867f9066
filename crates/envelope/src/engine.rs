//! [`EnvelopeEngine`]: encrypt, decrypt and re-encrypt whole payloads.
//!
//! # Encrypt
//!
//! 1. Draw a fresh DEK and nonce from the [`RandomSource`].
//! 2. Seal the payload with AES-256-GCM.
//! 3. Wrap the DEK through the [`KeyManagementClient`].
//! 4. Pack ciphertext, nonce and wrapped DEK into an envelope.
//!
//! # Decrypt
//!
//! The envelope is split from the tail at the provider's nominal wrapped-key
//! length. If unwrapping or opening fails in a way consistent with a
//! mis-measured wrapped key, the split is retried once, one byte shorter.
//! Some providers emit keys one byte shorter than nominal depending on key
//! version.
//!
//! # Security invariants
//!
//! - The plaintext DEK lives only inside a single call and is zeroed on drop.
//! - Decrypted plaintext is returned in a [`Zeroizing`] buffer.
//! - No key material or plaintext is logged.

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use common::{EnvelopeError, KmsProvider};

use crate::codec;
use crate::crypto::{cipher, NONCE_LEN};
use crate::dek::DataEncryptionKey;
use crate::kms::KeyManagementClient;
use crate::rng::{OsRandom, RandomSource};

/// Envelope geometry used to split decoded envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of the nonce region. Always [`NONCE_LEN`] for AES-GCM.
    pub nonce_len: usize,
    /// Length of a wrapped DEK as produced by the configured provider.
    pub nominal_wrapped_key_len: usize,
}

impl EngineConfig {
    /// Geometry for a provider whose wrapped keys are `nominal_wrapped_key_len` bytes.
    pub fn new(nominal_wrapped_key_len: usize) -> Self {
        Self {
            nonce_len: NONCE_LEN,
            nominal_wrapped_key_len,
        }
    }
}

impl From<KmsProvider> for EngineConfig {
    fn from(provider: KmsProvider) -> Self {
        Self::new(provider.nominal_wrapped_key_len())
    }
}

/// Orchestrates envelope encryption against one KMS client.
///
/// Holds no per-operation state, so one engine may serve many files. Each
/// call owns its DEK, nonce and buffers exclusively.
pub struct EnvelopeEngine {
    config: EngineConfig,
    kms: Box<dyn KeyManagementClient>,
    rng: Box<dyn RandomSource>,
}

impl EnvelopeEngine {
    /// Create an engine that draws keys and nonces from the OS CSPRNG.
    pub fn new(config: EngineConfig, kms: Box<dyn KeyManagementClient>) -> Self {
        Self {
            config,
            kms,
            rng: Box::new(OsRandom),
        }
    }

    /// Replace the random source (deterministic sources in tests).
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Encrypt `plaintext` and return the serialised envelope.
    ///
    /// The caller must persist the envelope before destroying the source.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::EntropyUnavailable`] if key or nonce generation fails.
    /// - Any KMS error from wrapping, unchanged.
    /// - [`EnvelopeError::InvalidKeyMaterial`] if the KMS returns a wrapped key
    ///   whose length the decrypt path could not split.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        single_line: bool,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let dek = DataEncryptionKey::generate(self.rng.as_ref())?;
        let nonce = cipher::generate_nonce(self.rng.as_ref())?;

        let ciphertext = cipher::seal(dek.as_bytes(), &nonce, plaintext, &[])?;
        let wrapped_key = self.kms.wrap_key(key_id, dek.as_bytes())?;
        self.check_wrapped_key_len(wrapped_key.len())?;

        debug!(
            key_id,
            plaintext_len = plaintext.len(),
            wrapped_key_len = wrapped_key.len(),
            "payload sealed and DEK wrapped"
        );
        Ok(codec::pack(&ciphertext, &nonce, &wrapped_key, single_line))
    }

    /// Decrypt an envelope produced by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::MalformedEnvelope`] / [`EnvelopeError::EnvelopeTooShort`]
    ///   before any KMS call is made.
    /// - [`EnvelopeError::KeyServiceUnavailable`], surfaced as-is.
    /// - [`EnvelopeError::DecryptionFailed`] wrapping the last error once both
    ///   wrapped-key lengths have been tried.
    /// - Any other KMS rejection from the first attempt, unchanged.
    pub fn decrypt(
        &self,
        envelope: &[u8],
        key_id: &str,
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let decoded = codec::decode(envelope)?;
        let nominal = self.config.nominal_wrapped_key_len;

        let err = match self.open_at(&decoded, nominal, key_id) {
            Ok(plaintext) => return Ok(plaintext),
            Err(e) => e,
        };
        if nominal == 0 || !err.suggests_wrapped_key_length_mismatch() {
            return Err(err);
        }

        debug!(error = %err, nominal, "retrying with a one byte shorter wrapped key");
        match self.open_at(&decoded, nominal - 1, key_id) {
            Ok(plaintext) => {
                info!(
                    wrapped_key_len = nominal - 1,
                    nominal, "envelope decrypted with shortened wrapped key"
                );
                Ok(plaintext)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "decryption failed at both wrapped-key lengths");
                Err(EnvelopeError::DecryptionFailed(Box::new(e)))
            }
        }
    }

    /// Decrypt `envelope` and encrypt the plaintext again under a fresh DEK.
    ///
    /// The intermediate plaintext is zeroed before this returns.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::decrypt`] or [`Self::encrypt`].
    pub fn reencrypt(
        &self,
        envelope: &[u8],
        key_id: &str,
        single_line: bool,
    ) -> Result<Vec<u8>, EnvelopeError> {
        let plaintext = self.decrypt(envelope, key_id)?;
        self.encrypt(&plaintext, key_id, single_line)
    }

    fn open_at(
        &self,
        decoded: &[u8],
        wrapped_key_len: usize,
        key_id: &str,
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let parts = codec::split(decoded, self.config.nonce_len, wrapped_key_len)?;
        let unwrapped = self.kms.unwrap_key(key_id, parts.wrapped_key)?;
        let dek = DataEncryptionKey::from_slice(&unwrapped)?;
        cipher::open(dek.as_bytes(), parts.nonce, parts.ciphertext, &[]).map(Zeroizing::new)
    }

    // Reject wrapped keys that decrypt could not split back out.
    fn check_wrapped_key_len(&self, len: usize) -> Result<(), EnvelopeError> {
        let nominal = self.config.nominal_wrapped_key_len;
        if len == nominal || len + 1 == nominal {
            return Ok(());
        }
        Err(EnvelopeError::InvalidKeyMaterial(format!(
            "KMS returned a {len}-byte wrapped key; \
             envelopes for this provider expect {nominal} bytes"
        )))
    }
}
