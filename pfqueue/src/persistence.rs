//! Persistance à plat des états par entité
//!
//! Un fichier JSON par entité : la file restante de chaque appareil, le
//! registre des préférences, la sélection de collections par défaut. Les
//! écritures sont synchrones sur le fil appelant, juste après la
//! mutation ; un échec d'écriture est journalisé et non fatal, l'état en
//! mémoire reste la référence jusqu'à la prochaine écriture réussie. Un
//! blob illisible est traité comme absent.

use crate::settings::DeviceSettings;
use crate::{Error, Result};
use pfcatalog::MediaKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Dépôt des états persistés (un répertoire, un fichier JSON par entité)
pub struct PersistenceStore {
    storage_dir: PathBuf,
}

/// Remplace tout caractère hasardeux d'un identifiant destiné à un nom de fichier
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl PersistenceStore {
    /// Ouvre (et crée si besoin) le répertoire de stockage
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).map_err(|e| {
            Error::PersistenceError(format!(
                "Failed to create storage directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;
        Ok(Self { storage_dir })
    }

    fn queue_file(&self, device_id: &str) -> PathBuf {
        self.storage_dir
            .join(format!("queue_{}.json", sanitize_id(device_id)))
    }

    fn devices_file(&self) -> PathBuf {
        self.storage_dir.join("devices.json")
    }

    fn default_collections_file(&self) -> PathBuf {
        self.storage_dir.join("collections.json")
    }

    /// Écrit un blob JSON ; l'échec est journalisé, jamais propagé
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) {
        let result = serde_json::to_vec_pretty(value)
            .map_err(|e| e.to_string())
            .and_then(|bytes| fs::write(path, bytes).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::error!(file=%path.display(), error=%e, "Failed to persist state");
        }
    }

    /// Relit un blob JSON ; absent ou corrompu donne None
    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    file=%path.display(),
                    error=%e,
                    "Corrupt persisted state, reinitializing"
                );
                None
            }
        }
    }

    /// Sauvegarde la file restante d'un appareil
    pub fn save_queue(&self, device_id: &str, remaining: &[MediaKey]) {
        self.write_json(&self.queue_file(device_id), &remaining);
    }

    /// Recharge la file restante d'un appareil
    pub fn load_queue(&self, device_id: &str) -> Option<Vec<MediaKey>> {
        self.read_json(&self.queue_file(device_id))
    }

    /// Supprime le fichier de file d'un appareil
    pub fn delete_queue(&self, device_id: &str) {
        let path = self.queue_file(device_id);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::error!(file=%path.display(), error=%e, "Failed to delete queue file");
            }
        }
    }

    /// Sauvegarde le registre des préférences
    pub fn save_devices(&self, devices: &HashMap<String, DeviceSettings>) {
        self.write_json(&self.devices_file(), devices);
    }

    /// Recharge le registre des préférences
    pub fn load_devices(&self) -> Option<HashMap<String, DeviceSettings>> {
        self.read_json(&self.devices_file())
    }

    /// Sauvegarde la sélection de collections par défaut
    pub fn save_default_collections(&self, selection: &Option<Vec<String>>) {
        self.write_json(&self.default_collections_file(), selection);
    }

    /// Recharge la sélection de collections par défaut
    pub fn load_default_collections(&self) -> Option<Option<Vec<String>>> {
        self.read_json(&self.default_collections_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_queue_blob_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();

        fs::write(dir.path().join("queue_dev1.json"), b"{not json").unwrap();
        assert!(store.load_queue("dev1").is_none());
    }

    #[test]
    fn device_ids_are_sanitized_for_filenames() {
        assert_eq!(sanitize_id("a/b\\c:d"), "a-b-c-d");
        assert_eq!(sanitize_id("550e8400-e29b"), "550e8400-e29b");
    }
}
