//! The key management boundary.
//!
//! The engine never talks to a KMS directly. Provider clients (AWS KMS, GCP
//! Cloud KMS, test doubles) implement [`KeyManagementClient`] and are handed
//! to [`crate::EnvelopeEngine`] at construction.

use zeroize::Zeroizing;

use common::EnvelopeError;

/// Wraps and unwraps data encryption keys with a remote master key.
///
/// Both calls block the current thread until the service responds. The core
/// does not retry them; retry policy, if any, belongs to the implementation.
#[cfg_attr(test, mockall::automock)]
pub trait KeyManagementClient: Send + Sync {
    /// Encrypt `plaintext_key` under the master key named by `key_id`.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::KeyServiceUnavailable`] for transient failures,
    /// [`EnvelopeError::KeyServiceRejected`] for terminal ones.
    fn wrap_key(&self, key_id: &str, plaintext_key: &[u8]) -> Result<Vec<u8>, EnvelopeError>;

    /// Recover a plaintext key previously returned by [`Self::wrap_key`].
    ///
    /// # Errors
    ///
    /// As for [`Self::wrap_key`]. A wrapped key the service cannot parse is
    /// reported as a rejection of kind
    /// [`common::RejectionKind::InvalidCiphertext`].
    fn unwrap_key(
        &self,
        key_id: &str,
        wrapped_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError>;
}
