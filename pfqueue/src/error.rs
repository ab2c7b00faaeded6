//! Types d'erreurs pour pfqueue

/// Erreurs de gestion des files d'appareils
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error(transparent)]
    Catalog(#[from] pfcatalog::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour pfqueue
pub type Result<T> = std::result::Result<T, Error>;
