use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

/// Suffix of in-progress writes. Readers skip files ending in it.
pub const TEMP_SUFFIX: &str = "tmp";

/// Write `contents` to `path` through a temp file in the same directory,
/// then rename it into place.
///
/// Readers see either the old file or the new one, never a torn write. The
/// parent directory must exist; it is never created here. On failure the
/// temp file is removed.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let tmp = temp_path(path);

    if let Err(e) = std::fs::write(&tmp, contents) {
        remove_temp(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        remove_temp(&tmp);
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(format!(".{:016x}.{}", rand::random::<u64>(), TEMP_SUFFIX));
    path.with_file_name(name)
}

fn remove_temp(tmp: &Path) {
    match std::fs::remove_file(tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %tmp.display(), error = %e, "Failed to remove temp file"),
    }
}
