//! Pre-write backups and restoring from them

use super::atomic::write_atomic;
use super::error::PatchError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Backup location relative to the project root
pub const BACKUP_DIR: &str = ".cfgpatch/backups";

/// Errors during restore
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("no backup found for {path}")]
    NoBackup { path: PathBuf },

    #[error("failed to read backup {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Write(#[from] PatchError),
}

/// A completed restore
#[derive(Debug, Clone)]
pub struct Restored {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    /// False when the backup could not be deleted after restoring
    pub backup_removed: bool,
}

/// Timestamped copies of files taken right before they are rewritten
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Store under `<root>/.cfgpatch/backups`
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(BACKUP_DIR),
        }
    }

    /// Copy `path` into the store and return the backup's path
    pub fn backup(&self, path: &Path) -> Result<PathBuf, PatchError> {
        let backup_err = |source: io::Error| PatchError::BackupFailed {
            path: path.to_path_buf(),
            source,
        };

        if !path.exists() {
            return Err(PatchError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(backup_err)?;

        // Fixed-width timestamp so names sort chronologically
        let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S%3f");
        let backup_path = self
            .dir
            .join(format!("{}.{}", file_name(path), timestamp));

        fs::copy(path, &backup_path).map_err(backup_err)?;
        tracing::info!(
            path = %path.display(),
            backup = %backup_path.display(),
            "backup created"
        );
        Ok(backup_path)
    }

    /// Newest backup for a file, if any
    pub fn latest(&self, path: &Path) -> Option<PathBuf> {
        let prefix = format!("{}.", file_name(path));
        let entries = fs::read_dir(&self.dir).ok()?;

        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                // `Podfile.<ts>` but not `Podfile.lock.<ts>`
                p.file_name()
                    .map(|n| {
                        n.to_string_lossy()
                            .strip_prefix(&prefix)
                            .is_some_and(|ts| {
                                !ts.is_empty() && ts.chars().all(|c| c.is_ascii_digit() || c == 'T')
                            })
                    })
                    .unwrap_or(false)
            })
            .max()
    }

    /// Put the newest backup back over `path` and drop that backup
    pub fn restore(&self, path: &Path) -> Result<Restored, RestoreError> {
        let backup_path = self.latest(path).ok_or_else(|| RestoreError::NoBackup {
            path: path.to_path_buf(),
        })?;

        let content =
            fs::read_to_string(&backup_path).map_err(|e| RestoreError::ReadFailed {
                path: backup_path.clone(),
                source: e,
            })?;

        write_atomic(path, &content)?;
        let backup_removed = discard(&backup_path);

        tracing::info!(
            path = %path.display(),
            backup = %backup_path.display(),
            "restored from backup"
        );
        Ok(Restored {
            path: path.to_path_buf(),
            backup_path,
            backup_removed,
        })
    }
}

/// Delete a used backup. A failure leaves the file in place and is logged.
fn discard(backup_path: &Path) -> bool {
    match fs::remove_file(backup_path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                backup = %backup_path.display(),
                error = %e,
                "restored, but could not remove backup"
            );
            false
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
