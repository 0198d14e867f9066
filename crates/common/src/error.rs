//! Error types shared by the envelope engine, the KMS clients, and the CLI.

use std::path::PathBuf;

use thiserror::Error;

/// Why a key service refused a wrap or unwrap request.
///
/// The engine only treats [`RejectionKind::InvalidCiphertext`] as a hint that
/// the wrapped key was sliced at the wrong length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The service could not parse or decrypt the wrapped key it was given.
    InvalidCiphertext,
    /// The caller is not allowed to use the key.
    PermissionDenied,
    /// The key (or key version) does not exist or is disabled.
    NotFound,
    /// Any other terminal refusal.
    Other,
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionKind::InvalidCiphertext => "invalid ciphertext",
            RejectionKind::PermissionDenied => "permission denied",
            RejectionKind::NotFound => "not found",
            RejectionKind::Other => "rejected",
        };
        f.write_str(s)
    }
}

/// Top-level error type for every envelope operation.
///
/// Variants map to process exit codes (see [`EnvelopeError::exit_code`]):
/// - data errors (bad envelope, failed authentication) → 65
/// - [`EnvelopeError::EntropyUnavailable`] → 71
/// - [`EnvelopeError::SecureDeleteFailed`] → 74
/// - [`EnvelopeError::KeyServiceUnavailable`] → 75
/// - [`EnvelopeError::KeyServiceRejected`] → 77
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The OS random number generator could not supply bytes.
    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// A key or nonce had the wrong length.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The AES-GCM tag did not verify (wrong key, wrong nonce, or tampered data).
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The envelope is not valid base64.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The decoded envelope cannot hold a nonce and a wrapped key.
    #[error("envelope too short: got {len} bytes, the smallest possible envelope is {min} bytes")]
    EnvelopeTooShort { len: usize, min: usize },

    /// Every decryption attempt failed; wraps the last concrete error.
    #[error("decryption failed: {0}")]
    DecryptionFailed(#[source] Box<EnvelopeError>),

    /// The key service could not be reached or failed transiently.
    #[error("key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// The key service refused the request.
    #[error("key service rejected request ({kind}): {message}")]
    KeyServiceRejected { kind: RejectionKind, message: String },

    /// Zero-filling or removing a file did not complete.
    #[error("secure delete failed for {}: {source}", path.display())]
    SecureDeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EnvelopeError {
    /// Shorthand for a [`EnvelopeError::KeyServiceRejected`].
    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        EnvelopeError::KeyServiceRejected {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, EnvelopeError::KeyServiceUnavailable(_))
    }

    /// Returns `true` if the failure is consistent with the wrapped key having
    /// been sliced at the wrong length, so a shorter slice is worth one more try.
    pub fn suggests_wrapped_key_length_mismatch(&self) -> bool {
        matches!(
            self,
            EnvelopeError::AuthenticationFailed
                | EnvelopeError::InvalidKeyMaterial(_)
                | EnvelopeError::KeyServiceRejected {
                    kind: RejectionKind::InvalidCiphertext,
                    ..
                }
        )
    }

    /// Returns the process exit code (sysexits.h) for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            EnvelopeError::InvalidKeyMaterial(_)
            | EnvelopeError::AuthenticationFailed
            | EnvelopeError::MalformedEnvelope(_)
            | EnvelopeError::EnvelopeTooShort { .. } => 65,
            EnvelopeError::DecryptionFailed(inner) => inner.exit_code(),
            EnvelopeError::EntropyUnavailable(_) => 71,
            EnvelopeError::SecureDeleteFailed { .. } => 74,
            EnvelopeError::KeyServiceUnavailable(_) => 75,
            EnvelopeError::KeyServiceRejected { .. } => 77,
        }
    }
}
