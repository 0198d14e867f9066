//! Durable file output.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Write `contents` to `path` so that a reader sees either the old file or
/// the complete new one, never a partial write.
///
/// The bytes go to a temporary file in the target's directory, are synced,
/// and the temporary file is renamed over `path`. The new file is created
/// with owner-only permissions.
///
/// # Errors
///
/// Returns an error if any step fails. The temporary file is removed on
/// failure and `path` is left as it was.
pub fn write_durably(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move output into place at {}", path.display()))?;

    // The rename itself lives in the directory entry.
    #[cfg(unix)]
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("failed to sync directory {}", dir.display()))?;

    Ok(())
}
