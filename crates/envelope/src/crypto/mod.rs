//! AES-256-GCM payload encryption primitives.
//!
//! This module is intentionally free of KMS and file-system dependencies.

pub mod cipher;

pub use cipher::{KEY_LEN, NONCE_LEN, TAG_LEN};
