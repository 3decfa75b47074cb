//! Loading target files and replacing them atomically

use super::error::PatchError;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Read a target file as UTF-8 text
pub fn load(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PatchError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PatchError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Replace `path` with `text` via a temp file in the same directory and a rename
pub fn write_atomic(path: &Path, text: &str) -> Result<(), PatchError> {
    write_atomic_with(path, text, |_| Ok(()))
}

/// Same as [`write_atomic`], running `before_rename` on the fully written
/// temp file right before it is renamed into place. An error from the hook
/// aborts the write and the temp file is removed on drop.
pub(crate) fn write_atomic_with<F>(path: &Path, text: &str, before_rename: F) -> Result<(), PatchError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let write_err = |source: io::Error| PatchError::WriteFailure {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(text.as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(write_err)?;
    }

    before_rename(tmp.path()).map_err(write_err)?;

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "file replaced");
    Ok(())
}
