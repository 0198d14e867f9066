//! Error taxonomy and KMS provider definitions shared across `envelope-kms` crates.

pub mod error;
pub mod provider;

pub use error::{EnvelopeError, RejectionKind};
pub use provider::KmsProvider;
