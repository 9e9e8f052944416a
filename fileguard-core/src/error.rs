use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the core file operations.
///
/// Structural problems (`Validation`) and sandbox violations (`AccessDenied`)
/// always fail fast; per-edit anchor misses are deliberately not represented
/// here because they are tolerated and only reflected in the edit count.
#[derive(Error, Debug)]
pub enum FileGuardError {
    #[error("Invalid edit batch: {0}")]
    Validation(String),

    #[error("Access denied: '{path}' resolves outside every registered root")]
    AccessDenied { path: String },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileGuardError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
