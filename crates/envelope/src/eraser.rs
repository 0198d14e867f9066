//! Zero-fill-then-remove deletion of source files.
//!
//! Only call [`erase`] once the artifact that replaces the file (envelope
//! or plaintext) has been written and synced. A failed erase is always
//! reported, because it means plaintext may still be recoverable on disk.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{info, warn};

use common::EnvelopeError;

const ZERO_CHUNK: usize = 64 * 1024;

/// What [`erase`] did with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseOutcome {
    /// The file was overwritten with `bytes` zeroes and removed.
    Erased { bytes: u64 },
    /// The path is a directory, symlink or other non-regular file and was left alone.
    SkippedNotAFile,
}

/// Overwrite the regular file at `path` with zeroes in place, then remove it.
///
/// Symlinks are not followed. Anything that is not a regular file is left
/// untouched and reported as [`EraseOutcome::SkippedNotAFile`].
///
/// # Errors
///
/// Returns [`EnvelopeError::SecureDeleteFailed`] if the path cannot be
/// inspected, or if the overwrite, sync or removal does not complete.
pub fn erase(path: &Path) -> Result<EraseOutcome, EnvelopeError> {
    let failed = |source: io::Error| EnvelopeError::SecureDeleteFailed {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::symlink_metadata(path).map_err(failed)?;
    if !metadata.file_type().is_file() {
        warn!(path = %path.display(), "not a regular file; skipped zero-fill and delete");
        return Ok(EraseOutcome::SkippedNotAFile);
    }

    let bytes = zero_fill(path).map_err(failed)?;
    fs::remove_file(path).map_err(failed)?;

    info!(path = %path.display(), bytes, "wiped and removed file");
    Ok(EraseOutcome::Erased { bytes })
}

fn zero_fill(path: &Path) -> io::Result<u64> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let zeros = [0u8; ZERO_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(ZERO_CHUNK as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()?;
    Ok(len)
}
