//! # pfcatalog - Catalogue média identitaire de PFrame
//!
//! Cette crate maintient l'index stable des fichiers médias d'une galerie :
//! - Clés opaques stables par identité physique (device+inode ou chemin
//!   canonique) : un renommage ne change pas la clé, un lien dur ou
//!   symbolique se confond avec sa cible
//! - Collections dérivées du dossier parent immédiat (non récursives)
//! - Scan complet publié atomiquement, sûr face aux lectures concurrentes
//! - Auto-réparation : une clé dont le fichier a disparu déclenche un
//!   re-scan à la première lecture validée
//! - Durées vidéo sondées paresseusement (ffprobe) et mises en cache
//!
//! # Architecture
//!
//! - **MediaCatalog** : instance unique partagée, verrou lecteurs/rédacteur
//! - **IdentityResolver** : stratégie d'identité choisie au démarrage
//! - **DurationProbe** : couture pour la sonde de durée (ffprobe par défaut)
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use pfcatalog::MediaCatalog;
//!
//! # fn main() -> pfcatalog::Result<()> {
//! let catalog = MediaCatalog::new("gallery", None, None)?;
//!
//! for key in catalog.keys() {
//!     if let Some(record) = catalog.get(&key) {
//!         println!("{} -> {}", key, record.rel_path);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod catalog;
mod duration;
mod error;
mod identity;
mod record;
mod scan;

#[cfg(feature = "pfconfig")]
mod config_ext;

// Réexports publics
pub use catalog::MediaCatalog;
pub use duration::{DurationProbe, FfprobeDurationProbe};
pub use error::{Error, Result};
pub use identity::{FileIdentity, IdentityResolver};
pub use record::{
    collection_id_from_rel_path, normalize_collection_id, CollectionInfo, MediaKey, MediaKind,
    MediaRecord, COLLECTION_ROOT_ID,
};

#[cfg(feature = "pfconfig")]
pub use config_ext::CatalogConfigExt;
