//! Scan complet de la galerie
//!
//! Le scan construit un index neuf à partir de zéro, en réutilisant les
//! clés de l'index précédent quand l'identité physique d'un fichier est
//! déjà connue. L'index construit est publié atomiquement par le
//! catalogue ; ce module ne touche jamais l'index en place.

use crate::identity::{FileIdentity, IdentityResolver};
use crate::record::{
    collection_id_from_rel_path, encode_url, normalize_collection_id, CollectionInfo, MediaKey,
    MediaKind, MediaRecord, COLLECTION_ROOT_ID,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions reconnues comme photos
pub(crate) const PHOTO_EXTENSIONS: &[&str] = &[
    "avif", "bmp", "gif", "heic", "heif", "jpeg", "jpg", "png", "tif", "tiff", "webp",
];

/// Extensions reconnues comme vidéos
pub(crate) const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "avi", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "webm",
];

/// Nature d'un fichier d'après son extension, None si inéligible
pub(crate) fn media_kind_for_path(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Paramètres immuables du scan
#[derive(Debug, Clone)]
pub(crate) struct ScanConfig {
    /// Racine canonique de la galerie
    pub media_dir: PathBuf,
    /// Suffixe des artefacts de fond, exclus du scan
    pub background_suffix: Option<String>,
    /// Sous-arbre de staging des uploads, exclu du scan (chemin absolu)
    pub staging_dir: Option<PathBuf>,
}

/// Index immuable du catalogue, reconstruit intégralement à chaque scan
#[derive(Debug, Default)]
pub(crate) struct CatalogIndex {
    /// Enregistrements par clé
    pub records: HashMap<MediaKey, MediaRecord>,
    /// Identité physique -> clé (permet la réutilisation des clés)
    pub identities: HashMap<FileIdentity, MediaKey>,
    /// Clés dans l'ordre du scan
    pub order: Vec<MediaKey>,
    /// Partition photos
    pub photo_keys: Vec<MediaKey>,
    /// Partition vidéos
    pub video_keys: Vec<MediaKey>,
    /// Collections triées par chemin d'affichage
    pub collections: Vec<CollectionInfo>,
    /// Clés par collection, dans l'ordre du scan
    pub collection_keys: HashMap<String, Vec<MediaKey>>,
}

fn rel_to_string(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(rel: &Path) -> bool {
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn is_staging(cfg: &ScanConfig, path: &Path) -> bool {
    cfg.staging_dir
        .as_ref()
        .is_some_and(|staging| path.starts_with(staging))
}

fn register_collection(collections: &mut BTreeMap<String, CollectionInfo>, rel: &Path) -> String {
    let (id, display_name, display_path, depth) = if rel.as_os_str().is_empty() {
        (
            COLLECTION_ROOT_ID.to_string(),
            COLLECTION_ROOT_ID.to_string(),
            COLLECTION_ROOT_ID.to_string(),
            0,
        )
    } else {
        let id = normalize_collection_id(&rel_to_string(rel));
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| id.clone());
        let path = format!("/{}", id);
        (id, name, path, rel.components().count())
    };

    collections
        .entry(id.clone())
        .or_insert_with(|| CollectionInfo {
            id: id.clone(),
            display_name,
            display_path,
            depth,
            files_count: 0,
        });
    id
}

/// Scan complet : construit un index neuf et la liste des clés nouvelles
pub(crate) fn scan(
    cfg: &ScanConfig,
    resolver: IdentityResolver,
    previous: &CatalogIndex,
) -> (CatalogIndex, Vec<MediaKey>) {
    let mut index = CatalogIndex::default();
    let mut collections: BTreeMap<String, CollectionInfo> = BTreeMap::new();
    let mut new_keys = Vec::new();

    let mut it = WalkDir::new(&cfg.media_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = it.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error=%e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        let rel = match path.strip_prefix(&cfg.media_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        if entry.file_type().is_dir() {
            // Dossiers cachés et staging : sous-arbres entiers ignorés
            if !rel.as_os_str().is_empty() && (is_hidden(&rel) || is_staging(cfg, path)) {
                it.skip_current_dir();
                continue;
            }
            // Enregistrée même vide, pour que les ids restent stables
            register_collection(&mut collections, &rel);
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if is_hidden(&rel) || is_staging(cfg, path) {
            continue;
        }
        if let Some(suffix) = &cfg.background_suffix {
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(suffix.as_str()) {
                continue;
            }
        }
        let Some(kind) = media_kind_for_path(path) else {
            continue;
        };

        let (identity, canonical) = match resolver.resolve(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!(path=%path.display(), error=%e, "Identity resolution failed, skipping");
                continue;
            }
        };
        if index.identities.contains_key(&identity) {
            // Lien dur ou symbolique dont la cible est déjà cataloguée
            continue;
        }

        // Identité connue : la clé survit au renommage. Inconnue : frappe.
        let key = previous
            .identities
            .get(&identity)
            .cloned()
            .unwrap_or_else(|| MediaKey::mint(&canonical));

        let rel_path = rel_to_string(&rel);
        let collection = collection_id_from_rel_path(&rel_path);
        let duration = match kind {
            MediaKind::Video => previous.records.get(&key).and_then(|r| r.duration),
            MediaKind::Photo => None,
        };

        if !previous.records.contains_key(&key) {
            new_keys.push(key.clone());
        }

        let record = MediaRecord {
            key: key.clone(),
            url: encode_url(&rel_path),
            rel_path,
            kind,
            duration,
            collection: collection.clone(),
        };

        index.identities.insert(identity, key.clone());
        index.order.push(key.clone());
        match kind {
            MediaKind::Photo => index.photo_keys.push(key.clone()),
            MediaKind::Video => index.video_keys.push(key.clone()),
        }
        index
            .collection_keys
            .entry(collection.clone())
            .or_default()
            .push(key.clone());
        if let Some(info) = collections.get_mut(&collection) {
            info.files_count += 1;
        }
        index.records.insert(key, record);
    }

    index.collections = collections.into_values().collect();
    index
        .collections
        .sort_by(|a, b| a.display_path.cmp(&b.display_path));

    (index, new_keys)
}
