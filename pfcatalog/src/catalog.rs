//! MediaCatalog : index identitaire et partagé de la galerie
//!
//! Le catalogue est l'unique état partagé entre tous les appareils. Un
//! `sync()` reconstruit un index complet hors verrou puis le publie
//! atomiquement : aucun lecteur ne peut observer un index à moitié
//! construit, et deux `sync()` concurrents se contentent de publier l'un
//! après l'autre.

use crate::duration::{DurationEntry, DurationProbe, FfprobeDurationProbe, FileStamp};
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::record::{normalize_collection_id, CollectionInfo, MediaKey, MediaKind, MediaRecord};
use crate::scan::{scan, CatalogIndex, ScanConfig};
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Catalogue des médias découverts dans la galerie
///
/// Instance unique, longue durée de vie, partagée derrière un `Arc` entre
/// le gestionnaire de files et les tâches de fond. Les recherches prennent
/// un verrou en lecture ; seul `sync()` prend le verrou en écriture, et
/// uniquement le temps d'échanger l'index.
pub struct MediaCatalog {
    cfg: ScanConfig,
    resolver: IdentityResolver,
    index: RwLock<CatalogIndex>,
    probe: Box<dyn DurationProbe>,
    durations: Mutex<HashMap<MediaKey, DurationEntry>>,
}

impl MediaCatalog {
    /// Ouvre un catalogue sur une racine de galerie et fait un premier scan
    ///
    /// # Arguments
    ///
    /// * `media_dir` - Racine de la galerie
    /// * `background_suffix` - Suffixe des artefacts de fond à exclure
    /// * `staging_subdir` - Sous-répertoire de staging à exclure, relatif à la racine
    pub fn new(
        media_dir: impl AsRef<Path>,
        background_suffix: Option<String>,
        staging_subdir: Option<String>,
    ) -> Result<Self> {
        let media_dir = media_dir.as_ref();
        if !media_dir.exists() {
            return Err(Error::MediaRootNotFound(media_dir.display().to_string()));
        }
        let media_dir = std::fs::canonicalize(media_dir)?;
        if !media_dir.is_dir() {
            return Err(Error::MediaRootNotADirectory(
                media_dir.display().to_string(),
            ));
        }

        let staging_dir = staging_subdir
            .filter(|s| !s.is_empty())
            .map(|s| media_dir.join(s));

        let catalog = Self {
            cfg: ScanConfig {
                media_dir,
                background_suffix: background_suffix.filter(|s| !s.is_empty()),
                staging_dir,
            },
            resolver: IdentityResolver::platform_default(),
            index: RwLock::new(CatalogIndex::default()),
            probe: Box::new(FfprobeDurationProbe),
            durations: Mutex::new(HashMap::new()),
        };
        catalog.sync();
        Ok(catalog)
    }

    /// Remplace la sonde de durée (tests, plateformes sans ffprobe)
    pub fn with_probe(mut self, probe: Box<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Racine canonique de la galerie
    pub fn media_dir(&self) -> &Path {
        &self.cfg.media_dir
    }

    /// Chemin absolu du fichier derrière un enregistrement
    pub fn abs_path(&self, record: &MediaRecord) -> PathBuf {
        self.cfg.media_dir.join(&record.rel_path)
    }

    /// Re-scan complet de la galerie
    ///
    /// Construit l'index neuf hors verrou (réutilisation des clés par
    /// identité), puis le publie atomiquement. Les clés disparues sont
    /// purgées, ainsi que leurs durées en cache. Retourne les clés
    /// nouvellement frappées.
    pub fn sync(&self) -> Vec<MediaKey> {
        // Copie de l'index courant : le scan lit les identités et les
        // durées connues sans tenir le verrou pendant les I/O.
        let previous = {
            let index = self.index.read().unwrap();
            CatalogIndex {
                records: index.records.clone(),
                identities: index.identities.clone(),
                ..CatalogIndex::default()
            }
        };

        let (next, new_keys) = scan(&self.cfg, self.resolver, &previous);

        let live: HashSet<MediaKey> = next.records.keys().cloned().collect();
        let removed = previous
            .records
            .keys()
            .filter(|k| !live.contains(*k))
            .count();

        {
            let mut durations = self.durations.lock().unwrap();
            durations.retain(|key, _| live.contains(key));
        }

        let total = next.records.len();
        {
            let mut index = self.index.write().unwrap();
            *index = next;
        }

        tracing::debug!(
            total,
            new = new_keys.len(),
            removed,
            "Catalog synchronized"
        );
        new_keys
    }

    /// Recherche pure, sans effet de bord
    ///
    /// Retourne l'enregistrement tel que connu de l'index, sans vérifier
    /// que le fichier existe toujours sur disque.
    pub fn peek(&self, key: &MediaKey) -> Option<MediaRecord> {
        let index = self.index.read().unwrap();
        let mut record = index.records.get(key).cloned()?;
        drop(index);

        if record.kind == MediaKind::Video && record.duration.is_none() {
            let durations = self.durations.lock().unwrap();
            if let Some(entry) = durations.get(key) {
                record.duration = Some(entry.seconds);
            }
        }
        Some(record)
    }

    /// Recherche validée, avec auto-réparation
    ///
    /// Si le fichier derrière une clé connue a disparu du disque, un
    /// re-scan est déclenché pour que la clé morte sorte d'elle-même des
    /// files de tous les consommateurs, et la recherche signale l'absence.
    /// C'est le chemin explicite de résorption des suppressions ; les
    /// lectures qui n'ont pas besoin de cette garantie passent par `peek`.
    pub fn get(&self, key: &MediaKey) -> Option<MediaRecord> {
        let record = self.peek(key)?;
        if self.abs_path(&record).exists() {
            return Some(record);
        }
        tracing::warn!(key=%key, rel_path=%record.rel_path, "Cataloged file vanished, resyncing");
        self.sync();
        None
    }

    /// Nombre d'entrées du catalogue
    pub fn len(&self) -> usize {
        self.index.read().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Toutes les clés, dans l'ordre du scan
    pub fn keys(&self) -> Vec<MediaKey> {
        self.index.read().unwrap().order.clone()
    }

    /// Nombre de photos cataloguées
    pub fn photo_key_count(&self) -> usize {
        self.index.read().unwrap().photo_keys.len()
    }

    /// Vrai si au moins une photo est cataloguée
    pub fn has_photos(&self) -> bool {
        self.photo_key_count() > 0
    }

    /// Union dédupliquée des clés des collections demandées
    ///
    /// Les identifiants sont normalisés ; une collection inconnue ne
    /// contribue rien (jamais d'erreur). L'ordre est l'ordre du scan, et
    /// chaque identité physique apparaît au plus une fois.
    pub fn get_keys_for_collections(&self, ids: &[String]) -> Vec<MediaKey> {
        let wanted: HashSet<String> = ids.iter().map(|id| normalize_collection_id(id)).collect();

        let index = self.index.read().unwrap();
        index
            .order
            .iter()
            .filter(|key| {
                index
                    .records
                    .get(*key)
                    .is_some_and(|r| wanted.contains(&r.collection))
            })
            .cloned()
            .collect()
    }

    /// Arbre des collections, trié par chemin d'affichage
    pub fn collections_tree(&self) -> Vec<CollectionInfo> {
        self.index.read().unwrap().collections.clone()
    }

    /// Libellés des collections (id -> nom d'affichage)
    pub fn collection_labels(&self) -> HashMap<String, String> {
        self.index
            .read()
            .unwrap()
            .collections
            .iter()
            .map(|c| (c.id.clone(), c.display_name.clone()))
            .collect()
    }

    /// Durée d'une vidéo, sondée au premier besoin réel
    ///
    /// La durée est mise en cache contre (taille, mtime) : un fichier
    /// inchangé n'est jamais re-sondé. Un échec de sonde ou de stat dégrade
    /// vers 0 seconde, jamais vers une erreur. Les photos valent 0.
    pub fn ensure_duration(&self, record: &MediaRecord) -> u64 {
        if record.kind != MediaKind::Video {
            return 0;
        }

        let path = self.abs_path(record);
        let Some(stamp) = FileStamp::of(&path) else {
            tracing::warn!(rel_path=%record.rel_path, "Stat failed, duration defaults to 0");
            return record.duration.unwrap_or(0);
        };

        {
            let durations = self.durations.lock().unwrap();
            if let Some(entry) = durations.get(&record.key) {
                if entry.stamp == stamp {
                    return entry.seconds;
                }
            }
        }

        // Sonde hors verrou : appel synchrone borné
        let seconds = self.probe.probe(&path).unwrap_or_else(|| {
            tracing::warn!(rel_path=%record.rel_path, "Duration probe failed, defaulting to 0");
            0
        });

        let mut durations = self.durations.lock().unwrap();
        durations.insert(record.key.clone(), DurationEntry { stamp, seconds });
        seconds
    }

    /// Chemin relatif d'une photo de fond prise au hasard
    ///
    /// Jusqu'à cinq tirages parmi les photos cataloguées ; seule une photo
    /// encore présente sur disque est retournée.
    pub fn random_photo_background(&self) -> Option<String> {
        for _ in 0..5 {
            let candidate = {
                let index = self.index.read().unwrap();
                index.photo_keys.choose(&mut rand::rng()).cloned()
            }?;
            if let Some(record) = self.peek(&candidate) {
                if self.abs_path(&record).exists() {
                    return Some(record.rel_path);
                }
            }
        }
        None
    }
}
