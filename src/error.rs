//! Error types for walkpipe
//!
//! Grouped by who has to react:
//! - resource errors (`NotFound`, `Io`, `Released`) go back to whoever asked
//!   to open a path or an entry
//! - protocol violations (`AlreadyOpen`, `EntryClosed`) are caller bugs
//! - traversal errors (`Traversal`, `Archive`, `Checksum`, `Unsupported`)
//!   end one container branch, never the process
//! - pattern errors (`Pattern`) drop one pattern's matches

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, WalkError>;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Can't access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Container {} is already released", path.display())]
    Released { path: PathBuf },

    #[error("Resource already open: {name}")]
    AlreadyOpen { name: String },

    #[error("Entry {name} is closed")]
    EntryClosed { name: String },

    #[error("Traversal of {} failed: {message}", path.display())]
    Traversal { path: PathBuf, message: String },

    #[error("Malformed archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Unsupported compression method {method} for {name}")]
    Unsupported { name: String, method: u16 },

    #[error("Checksum mismatch for {name}")]
    Checksum { name: String },

    #[error("Bad pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
}

impl WalkError {
    /// Wrap an I/O error, turning `NotFound` into the dedicated variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            WalkError::NotFound { path }
        } else {
            WalkError::Io { path, source }
        }
    }

    /// Attach an archive path to a format-level parse failure.
    pub fn archive(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        WalkError::Archive {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }

    /// True for caller bugs: reopening or using a closed entry.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            WalkError::AlreadyOpen { .. } | WalkError::EntryClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = WalkError::io(
            "missing.zip",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, WalkError::NotFound { .. }));
        assert_eq!(err.to_string(), "Path not found: missing.zip");
    }

    #[test]
    fn protocol_violations_are_flagged() {
        let err = WalkError::AlreadyOpen { name: "a.txt".into() };
        assert!(err.is_protocol_violation());
        assert_eq!(err.to_string(), "Resource already open: a.txt");
        assert!(!WalkError::Released { path: "x".into() }.is_protocol_violation());
    }
}
