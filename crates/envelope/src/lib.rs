//! Envelope encryption engine.
//!
//! A fresh AES-256 data encryption key (DEK) and nonce are generated for every
//! encrypt call. The payload is sealed locally with AES-256-GCM, the DEK is
//! wrapped by a remote KMS, and ciphertext, nonce and wrapped DEK are packed
//! into one base64 envelope:
//!
//! ```text
//! base64( ciphertext+tag || nonce (12 bytes) || wrapped DEK (provider-specific) )
//! ```
//!
//! The plaintext DEK only ever lives in memory and is zeroed on drop.
//!
//! This crate is free of network and CLI dependencies. KMS access goes through
//! the [`KeyManagementClient`] trait, implemented outside the core.

pub mod codec;
pub mod crypto;
pub mod dek;
pub mod engine;
pub mod eraser;
pub mod kms;
pub mod rng;

pub use common::{EnvelopeError, KmsProvider, RejectionKind};
pub use engine::{EngineConfig, EnvelopeEngine};
pub use eraser::{erase, EraseOutcome};
pub use kms::KeyManagementClient;
pub use rng::{OsRandom, RandomSource};
