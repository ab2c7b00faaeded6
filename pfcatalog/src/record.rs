//! Types du modèle de données : clés, enregistrements média, collections

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Identifiant de la collection racine (fichiers directement sous la galerie)
pub const COLLECTION_ROOT_ID: &str = "/";

// Jeu de caractères à encoder dans les URLs d'affichage ('/' reste en clair)
const URL_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%')
    .add(b'&')
    .add(b'+');

/// Clé stable et opaque d'un fichier média
///
/// Frappée une seule fois par identité physique : le même fichier garde la
/// même clé à travers renommages et déplacements tant que son identité
/// (device+inode ou chemin canonique) reste résoluble.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaKey(String);

impl MediaKey {
    /// Frappe une clé depuis le chemin canonique résolu (SHA-256 hex)
    pub(crate) fn mint(canonical: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nature d'un média
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

/// Enregistrement d'un fichier média observé dans la galerie
#[derive(Debug, Clone)]
pub struct MediaRecord {
    /// Clé stable
    pub key: MediaKey,
    /// Chemin relatif à la galerie, séparateurs '/'
    pub rel_path: String,
    /// Chemin relatif encodé pour les URLs d'affichage
    pub url: String,
    /// Photo ou vidéo
    pub kind: MediaKind,
    /// Durée en secondes (vidéos uniquement, calculée paresseusement)
    pub duration: Option<u64>,
    /// Collection d'appartenance (dossier parent immédiat)
    pub collection: String,
}

impl MediaRecord {
    pub fn is_video(&self) -> bool {
        self.kind.is_video()
    }
}

/// Métadonnées d'une collection (dossier de la galerie)
///
/// Les collections sont des regroupements non récursifs : un sous-dossier
/// est une collection distincte, jamais comptée dans son parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub display_name: String,
    pub display_path: String,
    pub depth: usize,
    pub files_count: usize,
}

/// Encode un chemin relatif pour une URL d'affichage
pub(crate) fn encode_url(rel_path: &str) -> String {
    utf8_percent_encode(rel_path, URL_ENCODE_SET).to_string()
}

/// Normalise un identifiant de collection
///
/// Une valeur vide correspond à la collection racine ; les barres obliques
/// de tête et de queue sont retirées, sauf pour la racine.
pub fn normalize_collection_id(collection_id: &str) -> String {
    let cleaned = collection_id.trim().trim_matches('/');
    if cleaned.is_empty() {
        COLLECTION_ROOT_ID.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Identifiant de collection d'un fichier, d'après son chemin relatif
///
/// Seul le dossier parent immédiat compte.
pub fn collection_id_from_rel_path(rel_path: &str) -> String {
    match rel_path.rsplit_once('/') {
        Some((parent, _)) => normalize_collection_id(parent),
        None => COLLECTION_ROOT_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_empty_and_slashes_to_root() {
        assert_eq!(normalize_collection_id(""), "/");
        assert_eq!(normalize_collection_id("  "), "/");
        assert_eq!(normalize_collection_id("/"), "/");
        assert_eq!(normalize_collection_id("/trip2019/"), "trip2019");
        assert_eq!(normalize_collection_id("trip2019/day1"), "trip2019/day1");
    }

    #[test]
    fn collection_id_uses_immediate_parent_only() {
        assert_eq!(collection_id_from_rel_path("photo.jpg"), "/");
        assert_eq!(collection_id_from_rel_path("trip2019/photo.jpg"), "trip2019");
        assert_eq!(
            collection_id_from_rel_path("trip2019/day1/photo.jpg"),
            "trip2019/day1"
        );
    }

    #[test]
    fn urls_encode_spaces_but_keep_separators() {
        assert_eq!(encode_url("trip 2019/café.jpg"), "trip%202019/caf%C3%A9.jpg");
    }

    #[test]
    fn keys_are_stable_for_a_given_canonical_path() {
        let a = MediaKey::mint(Path::new("/gallery/a.jpg"));
        let b = MediaKey::mint(Path::new("/gallery/a.jpg"));
        let c = MediaKey::mint(Path::new("/gallery/b.jpg"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
