//! Error types for rule application and file writes

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while patching one file
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    // Warning only: the file is not in the state the rule expected
    #[error("pattern not matched for rule '{rule}': {pattern}")]
    PatternNotMatched { rule: String, pattern: String },

    #[error("anchor not found for rule '{rule}': {anchor}")]
    AnchorNotFound { rule: String, anchor: String },

    #[error("anchor for rule '{rule}' matched {count} times, expected exactly one: {anchor}")]
    AnchorAmbiguous {
        rule: String,
        anchor: String,
        count: usize,
    },

    #[error("rule '{rule}' changes the file again when reapplied to its own output")]
    NotIdempotent { rule: String },

    #[error("failed to write {path}: {source}")]
    WriteFailure { path: PathBuf, source: io::Error },

    #[error("failed to back up {path}: {source}")]
    BackupFailed { path: PathBuf, source: io::Error },
}

impl PatchError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::FileNotFound { .. } => "FileNotFound",
            PatchError::ReadFailed { .. } => "ReadFailed",
            PatchError::PatternNotMatched { .. } => "PatternNotMatched",
            PatchError::AnchorNotFound { .. } => "AnchorNotFound",
            PatchError::AnchorAmbiguous { .. } => "AnchorAmbiguous",
            PatchError::NotIdempotent { .. } => "NotIdempotent",
            PatchError::WriteFailure { .. } => "WriteFailure",
            PatchError::BackupFailed { .. } => "BackupFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(
            PatchError::FileNotFound {
                path: PathBuf::from("ios/Podfile")
            }
            .kind(),
            "FileNotFound"
        );
        let err = PatchError::NotIdempotent {
            rule: "bitcode".into(),
        };
        assert_eq!(err.kind(), "NotIdempotent");
        assert!(err.to_string().contains("'bitcode'"));
    }

    #[test]
    fn test_display_includes_context() {
        let err = PatchError::AnchorAmbiguous {
            rule: "cpp14-insert".into(),
            anchor: "SWIFT_VERSION".into(),
            count: 2,
        };
        let display = err.to_string();
        assert!(display.contains("cpp14-insert"));
        assert!(display.contains("2 times"));
        assert_eq!(err.kind(), "AnchorAmbiguous");
    }
}
