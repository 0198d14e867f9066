//! Envelope wire format.
//!
//! ```text
//! base64-std-padded( ciphertext+tag || nonce || wrapped DEK )
//! ```
//!
//! There are no delimiters or length prefixes: the nonce and wrapped-key
//! lengths must be known up front, and the blob is split from the tail.
//! The encoded text may be broken into lines of [`LINE_WIDTH`] characters;
//! line breaks carry no meaning and are stripped before decoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use common::EnvelopeError;

/// Number of encoded characters per line in multi-line envelopes.
pub const LINE_WIDTH: usize = 40;

/// The three regions of a decoded envelope, borrowed from the decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    /// AES-GCM ciphertext, tag included.
    pub ciphertext: &'a [u8],
    /// Nonce the ciphertext was sealed with.
    pub nonce: &'a [u8],
    /// DEK as wrapped by the KMS.
    pub wrapped_key: &'a [u8],
}

/// Serialise an envelope.
///
/// With `single_line == false` a `\n` is inserted after every
/// [`LINE_WIDTH`] encoded characters. No trailing newline is added.
pub fn pack(ciphertext: &[u8], nonce: &[u8], wrapped_key: &[u8], single_line: bool) -> Vec<u8> {
    let mut raw = Vec::with_capacity(ciphertext.len() + nonce.len() + wrapped_key.len());
    raw.extend_from_slice(ciphertext);
    raw.extend_from_slice(nonce);
    raw.extend_from_slice(wrapped_key);

    let encoded = STANDARD.encode(&raw).into_bytes();
    if single_line {
        encoded
    } else {
        insert_line_breaks(&encoded, LINE_WIDTH)
    }
}

/// Strip line breaks (and any other ASCII whitespace) and base64-decode.
///
/// # Errors
///
/// Returns [`EnvelopeError::MalformedEnvelope`] if the remaining text is not
/// valid padded standard base64.
pub fn decode(envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let joined: Vec<u8> = envelope
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(&joined)
        .map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))
}

/// Smallest decoded length that can hold an empty ciphertext, a full nonce
/// and a full wrapped key.
pub fn min_decoded_len(nonce_len: usize, wrapped_key_len: usize) -> usize {
    nonce_len + wrapped_key_len
}

/// Split a decoded envelope from the tail.
///
/// The last `wrapped_key_len` bytes are the wrapped key, the `nonce_len` bytes
/// before them are the nonce, and everything before that is ciphertext.
///
/// # Errors
///
/// Returns [`EnvelopeError::EnvelopeTooShort`] if `decoded` is shorter than
/// [`min_decoded_len`].
pub fn split(
    decoded: &[u8],
    nonce_len: usize,
    wrapped_key_len: usize,
) -> Result<EnvelopeParts<'_>, EnvelopeError> {
    let min = min_decoded_len(nonce_len, wrapped_key_len);
    if decoded.len() < min {
        return Err(EnvelopeError::EnvelopeTooShort {
            len: decoded.len(),
            min,
        });
    }
    let (rest, wrapped_key) = decoded.split_at(decoded.len() - wrapped_key_len);
    let (ciphertext, nonce) = rest.split_at(rest.len() - nonce_len);
    Ok(EnvelopeParts {
        ciphertext,
        nonce,
        wrapped_key,
    })
}

/// Decode and split in one step, returning owned regions.
///
/// The engine uses [`decode`] and [`split`] directly so it can retry the split
/// at a second wrapped-key length without decoding twice.
///
/// # Errors
///
/// See [`decode`] and [`split`].
pub fn unpack(
    envelope: &[u8],
    nonce_len: usize,
    wrapped_key_len: usize,
) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), EnvelopeError> {
    let decoded = decode(envelope)?;
    let parts = split(&decoded, nonce_len, wrapped_key_len)?;
    Ok((
        parts.ciphertext.to_vec(),
        parts.nonce.to_vec(),
        parts.wrapped_key.to_vec(),
    ))
}

fn insert_line_breaks(encoded: &[u8], width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / width);
    for (i, chunk) in encoded.chunks(width).enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        out.extend_from_slice(chunk);
    }
    out
}
