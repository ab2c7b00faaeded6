//! Identité stable des fichiers sur disque
//!
//! Deux chemins qui désignent le même fichier physique (renommage, lien
//! symbolique, lien dur) doivent produire la même identité. La stratégie
//! est choisie une fois à la construction du catalogue : device+inode sur
//! les systèmes Unix, chemin canonique résolu ailleurs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Identité d'un fichier physique
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    /// Couple device + inode (Unix)
    Device { dev: u64, ino: u64 },
    /// Chemin canonique résolu (plateformes sans inode exploitable)
    Canonical(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    #[cfg(unix)]
    DeviceInode,
    CanonicalPath,
}

/// Résolveur d'identité
///
/// Une seule stratégie est sélectionnée au démarrage ; `resolve` ne
/// branche jamais par appel.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    strategy: Strategy,
}

impl IdentityResolver {
    /// Stratégie par défaut pour la plateforme courante
    pub fn platform_default() -> Self {
        #[cfg(unix)]
        {
            Self {
                strategy: Strategy::DeviceInode,
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                strategy: Strategy::CanonicalPath,
            }
        }
    }

    /// Résolveur basé sur le chemin canonique, quel que soit l'OS
    pub fn canonical_path() -> Self {
        Self {
            strategy: Strategy::CanonicalPath,
        }
    }

    /// Résout l'identité d'un fichier et retourne aussi son chemin canonique
    ///
    /// Les liens symboliques sont traversés : le lien et sa cible se
    /// confondent dans une seule identité.
    pub fn resolve(&self, path: &Path) -> io::Result<(FileIdentity, PathBuf)> {
        let canonical = fs::canonicalize(path)?;

        let identity = match self.strategy {
            #[cfg(unix)]
            Strategy::DeviceInode => {
                use std::os::unix::fs::MetadataExt;
                let metadata = fs::metadata(&canonical)?;
                FileIdentity::Device {
                    dev: metadata.dev(),
                    ino: metadata.ino(),
                }
            }
            Strategy::CanonicalPath => FileIdentity::Canonical(canonical.clone()),
        };

        Ok((identity, canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn hardlinks_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("a.jpg");
        let link = dir.path().join("b.jpg");
        fs::write(&original, b"data").unwrap();
        fs::hard_link(&original, &link).unwrap();

        let resolver = IdentityResolver::platform_default();
        let (id_a, _) = resolver.resolve(&original).unwrap();
        let (id_b, _) = resolver.resolve(&link).unwrap();
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn canonical_strategy_distinguishes_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let resolver = IdentityResolver::canonical_path();
        let (id_a, _) = resolver.resolve(&a).unwrap();
        let (id_b, _) = resolver.resolve(&b).unwrap();
        assert_ne!(id_a, id_b);
    }
}
