//! Sanitized artifact writing
//!
//! Reports and logs persisted by a job may be uploaded as workflow
//! artifacts, so they are scrubbed before they touch disk. Content is
//! written to a temp file next to the destination and renamed into place;
//! the temp file is removed on every error path when it is dropped.

use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::{BulwarkError, Result, SecretSanitizer};

/// Scrub `text` and atomically write it to `path`
///
/// Parent directories are created as needed. Returns the number of bytes
/// written.
pub fn write_sanitized_artifact(
    path: &Path,
    text: &str,
    sanitizer: &SecretSanitizer,
) -> Result<usize> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let clean = sanitizer.scrub(text);

    let mut tmp = tempfile::Builder::new()
        .prefix(".bulwark-artifact-")
        .tempfile_in(dir)?;
    tmp.write_all(clean.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| BulwarkError::Io(e.error))?;

    debug!("Wrote sanitized artifact {} ({} bytes)", path.display(), clean.len());
    Ok(clean.len())
}
