//! Extension de pfconfig pour le catalogue

use crate::error::Result;
use crate::MediaCatalog;
use std::path::PathBuf;

/// Trait d'extension pour pfconfig::Config
pub trait CatalogConfigExt {
    /// Retourne la racine de la galerie média
    fn media_root(&self) -> PathBuf;

    /// Ouvre le catalogue d'après la configuration
    fn open_catalog(&self) -> Result<MediaCatalog>;
}

impl CatalogConfigExt for pfconfig::Config {
    fn media_root(&self) -> PathBuf {
        // Utilise get_media_dir pour créer la galerie si elle n'existe pas
        let media_dir = self
            .get_media_dir()
            .expect("Failed to get or create media directory");
        PathBuf::from(media_dir)
    }

    fn open_catalog(&self) -> Result<MediaCatalog> {
        MediaCatalog::new(
            self.media_root(),
            self.get_background_suffix(),
            self.get_staging_subdir(),
        )
    }
}
