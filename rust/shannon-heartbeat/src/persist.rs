//! Crash-safe whole-file rewrites.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::HeartbeatResult;

/// Replace `path` with `contents` atomically.
///
/// The bytes are written to a uniquely named temporary file in the destination
/// directory (created if absent), synced, and renamed over `path`. On any
/// failure the temporary file is removed and `path` keeps its old content.
pub fn write_atomic(path: &Path, contents: &[u8]) -> HeartbeatResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
