//! DeviceQueueManager : orchestration des files par appareil
//!
//! Service construit explicitement et possédé par l'appelant (pas de
//! singleton global). Il fait le lien entre le catalogue partagé, le
//! registre des préférences et les files : résolution de la sélection
//! active, matérialisation paresseuse des files, et validation de fond
//! après chaque recharge.

use crate::persistence::PersistenceStore;
use crate::queue::DeviceQueue;
use crate::settings::{DeviceSettings, DeviceSettingsPatch};
use pfcatalog::{normalize_collection_id, MediaCatalog, MediaKey, MediaRecord};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Prochain média à diffuser, avec ses compteurs éventuels
#[derive(Debug, Clone)]
pub struct NextMedia {
    pub record: MediaRecord,
    /// (position, total) dans le cycle courant, si l'appareil les affiche
    pub counters: Option<(usize, usize)>,
}

/// Gestionnaire des files de lecture par appareil
///
/// Les files vivent chacune derrière son mutex dans une table partagée ;
/// les préférences et la sélection par défaut sont derrière des verrous
/// synchrones, jamais tenus à travers un await. Le catalogue est le seul
/// état partagé entre appareils.
pub struct DeviceQueueManager {
    catalog: Arc<MediaCatalog>,
    store: Arc<PersistenceStore>,
    queues: RwLock<HashMap<String, Arc<Mutex<DeviceQueue>>>>,
    devices: std::sync::RwLock<HashMap<String, DeviceSettings>>,
    default_collections: std::sync::RwLock<Option<Vec<String>>>,
    validation_guards: std::sync::Mutex<HashMap<String, Arc<AtomicBool>>>,
}

/// Normalise une sélection de collections
///
/// Identifiants normalisés et dédupliqués en conservant l'ordre ; une
/// sélection explicitement vide équivaut à None (retour aux défauts).
fn normalize_selection(selection: Option<Vec<String>>) -> Option<Vec<String>> {
    let ids = selection?;
    let mut seen = HashSet::new();
    let normalized: Vec<String> = ids
        .iter()
        .map(|id| normalize_collection_id(id))
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

impl DeviceQueueManager {
    /// Construit le gestionnaire sur un catalogue et un dépôt de persistance
    ///
    /// Les préférences et la sélection par défaut persistées sont
    /// rechargées ; les files ne se matérialisent qu'au premier besoin.
    pub fn new(catalog: Arc<MediaCatalog>, store: Arc<PersistenceStore>) -> Self {
        let devices = store.load_devices().unwrap_or_default();
        let default_collections = store.load_default_collections().flatten();
        tracing::info!(
            devices = devices.len(),
            has_default_selection = default_collections.is_some(),
            "Device queue manager initialized"
        );

        Self {
            catalog,
            store,
            queues: RwLock::new(HashMap::new()),
            devices: std::sync::RwLock::new(devices),
            default_collections: std::sync::RwLock::new(default_collections),
            validation_guards: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<MediaCatalog> {
        &self.catalog
    }

    /// Préférences d'un appareil, créées avec les défauts au premier contact
    fn settings_for(&self, device_id: &str) -> DeviceSettings {
        {
            let devices = self.devices.read().unwrap();
            if let Some(settings) = devices.get(device_id) {
                return settings.clone();
            }
        }

        let mut devices = self.devices.write().unwrap();
        let settings = devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                tracing::info!(device_id=%device_id, "New device registered");
                DeviceSettings::default()
            })
            .clone();
        self.store.save_devices(&devices);
        settings
    }

    /// Sélection active d'un appareil : son propre choix, sinon les défauts
    fn active_selection(&self, settings: &DeviceSettings) -> Option<Vec<String>> {
        match &settings.collections {
            Some(ids) => Some(ids.clone()),
            None => self.default_collections.read().unwrap().clone(),
        }
    }

    /// Allow-list d'une sélection : tout le catalogue si non restreinte
    fn allowed_keys(&self, selection: &Option<Vec<String>>) -> Vec<MediaKey> {
        match selection {
            None => self.catalog.keys(),
            Some(ids) => self.catalog.get_keys_for_collections(ids),
        }
    }

    /// File d'un appareil, matérialisée si besoin ; vrai si elle vient d'être créée
    async fn queue_entry(
        &self,
        device_id: &str,
        allowed: Vec<MediaKey>,
        shuffle: bool,
    ) -> (Arc<Mutex<DeviceQueue>>, bool) {
        {
            let queues = self.queues.read().await;
            if let Some(queue) = queues.get(device_id) {
                return (queue.clone(), false);
            }
        }

        let mut queues = self.queues.write().await;
        match queues.entry(device_id.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => (entry.get().clone(), false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let queue = Arc::new(Mutex::new(DeviceQueue::new(
                    device_id,
                    allowed,
                    shuffle,
                    self.store.clone(),
                )));
                entry.insert(queue.clone());
                (queue, true)
            }
        }
    }

    /// Prochain média pour un appareil
    ///
    /// Résout les préférences (créées au premier contact), calcule
    /// l'allow-list de la sélection active, matérialise ou rafraîchit la
    /// file, et délègue la distribution. Une sélection qui ne résout aucune
    /// clé donne None, jamais un repli silencieux sur tout le catalogue.
    pub async fn get_next(&self, device_id: &str) -> Option<NextMedia> {
        let settings = self.settings_for(device_id);
        let selection = self.active_selection(&settings);
        let allowed = self.allowed_keys(&selection);
        if allowed.is_empty() {
            tracing::warn!(
                device_id=%device_id,
                selection=?selection,
                "Active selection resolves no media"
            );
            return None;
        }

        let shuffle = !settings.sequential_mode;
        let (queue, created) = self.queue_entry(device_id, allowed.clone(), shuffle).await;

        let (record, counters, refilled, remaining) = {
            let mut queue = queue.lock().await;
            let refills_before = queue.refill_count();
            queue.set_shuffle(shuffle);
            queue.set_allowed_keys(allowed);
            let record = queue.take_next(&self.catalog, settings.only_photo)?;
            let counters = settings
                .show_counters
                .then(|| (queue.position(), queue.total()));
            let refilled = queue.refill_count() > refills_before;
            (record, counters, refilled, queue.remaining_keys())
        };

        if created || refilled {
            self.spawn_validation(device_id, remaining);
        }
        Some(NextMedia { record, counters })
    }

    /// Préférences connues d'un appareil
    pub fn get_device_settings(&self, device_id: &str) -> Option<DeviceSettings> {
        self.devices.read().unwrap().get(device_id).cloned()
    }

    /// Registre complet des appareils connus
    pub fn list_devices(&self) -> HashMap<String, DeviceSettings> {
        self.devices.read().unwrap().clone()
    }

    /// Applique une mise à jour partielle des préférences
    ///
    /// L'appareil est créé avec les défauts s'il est inconnu. Les champs
    /// qui influencent la distribution (mode séquentiel, filtre photo)
    /// prennent effet au prochain `get_next`.
    pub fn update_device_settings(
        &self,
        device_id: &str,
        patch: &DeviceSettingsPatch,
    ) -> DeviceSettings {
        let mut devices = self.devices.write().unwrap();
        let settings = devices.entry(device_id.to_string()).or_default();
        if settings.apply(patch) {
            let updated = settings.clone();
            self.store.save_devices(&devices);
            tracing::debug!(device_id=%device_id, "Device settings updated");
            updated
        } else {
            settings.clone()
        }
    }

    /// Enregistre un contact : dérive l'identifiant et rafraîchit ua/ip
    pub fn record_contact(&self, user_agent: &str, ip_address: &str) -> String {
        let device_id = crate::settings::derive_device_id(user_agent, ip_address);
        self.update_device_settings(
            &device_id,
            &DeviceSettingsPatch {
                user_agent: Some(user_agent.to_string()),
                ip_address: Some(ip_address.to_string()),
                ..Default::default()
            },
        );
        device_id
    }

    /// Change la sélection de collections d'un appareil
    ///
    /// `None` remet explicitement l'appareil sur la sélection par défaut.
    /// Si la sélection stockée change, la file matérialisée reconstruit
    /// son allow-list immédiatement.
    pub async fn set_device_collections(&self, device_id: &str, selection: Option<Vec<String>>) {
        let selection = normalize_selection(selection);

        let changed = {
            let mut devices = self.devices.write().unwrap();
            let settings = devices.entry(device_id.to_string()).or_default();
            if settings.collections == selection {
                false
            } else {
                settings.collections = selection.clone();
                self.store.save_devices(&devices);
                true
            }
        };
        if !changed {
            return;
        }
        tracing::info!(device_id=%device_id, selection=?selection, "Device collection selection changed");

        let settings = self.settings_for(device_id);
        let active = self.active_selection(&settings);
        let allowed = self.allowed_keys(&active);
        self.refresh_queue(device_id, allowed).await;
    }

    /// Change la sélection de collections par défaut du processus
    ///
    /// Les files matérialisées des appareils sans sélection propre sont
    /// rafraîchies immédiatement.
    pub async fn set_default_collections(&self, selection: Option<Vec<String>>) {
        let selection = normalize_selection(selection);

        {
            let mut defaults = self.default_collections.write().unwrap();
            if *defaults == selection {
                return;
            }
            *defaults = selection.clone();
        }
        self.store.save_default_collections(&selection);
        tracing::info!(selection=?selection, "Default collection selection changed");

        // Instantané des appareils à sélection propre, relâché avant l'await
        let overridden: HashSet<String> = {
            let devices = self.devices.read().unwrap();
            devices
                .iter()
                .filter(|(_, s)| s.collections.is_some())
                .map(|(id, _)| id.clone())
                .collect()
        };

        let followers: Vec<String> = {
            let queues = self.queues.read().await;
            queues
                .keys()
                .filter(|id| !overridden.contains(*id))
                .cloned()
                .collect()
        };

        let allowed = self.allowed_keys(&selection);
        for device_id in followers {
            self.refresh_queue(&device_id, allowed.clone()).await;
        }
    }

    /// Sélection de collections par défaut courante
    pub fn get_default_collections(&self) -> Option<Vec<String>> {
        self.default_collections.read().unwrap().clone()
    }

    /// Pousse une allow-list neuve dans une file matérialisée
    async fn refresh_queue(&self, device_id: &str, allowed: Vec<MediaKey>) {
        let queue = {
            let queues = self.queues.read().await;
            match queues.get(device_id) {
                Some(queue) => queue.clone(),
                None => return, // rien à rafraîchir, la file naîtra avec la bonne liste
            }
        };

        let remaining = {
            let mut queue = queue.lock().await;
            if !queue.set_allowed_keys(allowed) {
                return;
            }
            queue.remaining_keys()
        };
        self.spawn_validation(device_id, remaining);
    }

    /// Oublie la file d'un appareil (en mémoire et persistée)
    pub async fn delete_queue(&self, device_id: &str) {
        let removed = self.queues.write().await.remove(device_id);
        match removed {
            Some(queue) => queue.lock().await.delete_persisted(),
            None => self.store.delete_queue(device_id),
        }
        tracing::info!(device_id=%device_id, "Device queue deleted");
    }

    /// Oublie un appareil : sa file et ses préférences
    pub async fn delete_device(&self, device_id: &str) {
        self.delete_queue(device_id).await;

        let mut devices = self.devices.write().unwrap();
        if devices.remove(device_id).is_some() {
            self.store.save_devices(&devices);
            tracing::info!(device_id=%device_id, "Device settings deleted");
        }
    }

    /// Lance la validation de fond d'une file rechargée
    ///
    /// Tâche bloquante détachée : re-résout chaque clé restante (ce qui
    /// purge les clés mortes du catalogue via son auto-réparation) et
    /// pré-chauffe les durées vidéo. Au plus une en vol par appareil ;
    /// jamais d'attente côté distribution, une clé périmée sera de toute
    /// façon re-validée au moment du pop.
    fn spawn_validation(&self, device_id: &str, keys: Vec<MediaKey>) {
        let guard = {
            let mut guards = self.validation_guards.lock().unwrap();
            guards
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .clone()
        };
        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let catalog = self.catalog.clone();
        let device_id = device_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut dead = 0usize;
            for key in &keys {
                match catalog.get(key) {
                    Some(record) if record.is_video() => {
                        catalog.ensure_duration(&record);
                    }
                    Some(_) => {}
                    None => dead += 1,
                }
            }
            tracing::debug!(
                device_id=%device_id,
                checked = keys.len(),
                dead,
                "Queue validation finished"
            );
            guard.store(false, Ordering::SeqCst);
        });
    }
}
