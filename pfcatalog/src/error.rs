//! Types d'erreurs pour pfcatalog

/// Erreurs du catalogue média
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Media root not found: {0}")]
    MediaRootNotFound(String),

    #[error("Media root is not a directory: {0}")]
    MediaRootNotADirectory(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour pfcatalog
pub type Result<T> = std::result::Result<T, Error>;
