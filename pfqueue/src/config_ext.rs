//! Raccordement à la configuration pframe

use crate::persistence::PersistenceStore;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Accès aux réglages de stockage depuis la configuration
pub trait QueueConfigExt {
    /// Répertoire de stockage des états persistés
    fn storage_root(&self) -> PathBuf;

    /// Ouvre le dépôt de persistance configuré
    fn open_store(&self) -> Result<Arc<PersistenceStore>>;
}

impl QueueConfigExt for pfconfig::Config {
    fn storage_root(&self) -> PathBuf {
        // Utilise get_storage_dir pour créer le répertoire s'il n'existe pas
        let storage_dir = self
            .get_storage_dir()
            .expect("Failed to get or create storage directory");
        PathBuf::from(storage_dir)
    }

    fn open_store(&self) -> Result<Arc<PersistenceStore>> {
        Ok(Arc::new(PersistenceStore::new(self.storage_root())?))
    }
}
