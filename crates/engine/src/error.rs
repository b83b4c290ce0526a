// crates/engine/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced when a session root itself cannot be read.
///
/// Per-unit failures (one line, one file, one part) never become errors;
/// they degrade into visible `Info`/raw-JSON messages or are skipped by
/// finders. Only "the session does not resolve at all" reaches the caller.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("session not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading {path}")]
    PermissionDenied { path: PathBuf },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors during provider root discovery. Roots are resolved relative to
/// the home directory, so nothing can be discovered without one.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("home directory not found")]
    HomeDirNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kind_classification() {
        let err = ParseError::io(
            "/p",
            std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        );
        assert!(matches!(err, ParseError::NotFound { .. }));

        let err = ParseError::io(
            "/p",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ParseError::PermissionDenied { .. }));

        let err = ParseError::io(
            "/p",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
        );
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn display_includes_path() {
        let err = ParseError::NotFound {
            path: "/home/u/.codex/sessions/x.jsonl".into(),
        };
        assert!(err.to_string().contains(".codex/sessions/x.jsonl"));
    }
}
