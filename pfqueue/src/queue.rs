//! DeviceQueue : distributeur sans remise, rechargé à l'épuisement
//!
//! Chaque appareil possède sa file : une permutation (ou l'ordre naturel)
//! de son allow-list, dépilée par la queue jusqu'à épuisement puis
//! remplacée en bloc par un cycle neuf. La liste restante est l'unité de
//! persistance : un redémarrage reprend le cycle exactement où le
//! processus précédent s'était arrêté.
//!
//! Invariant : entre deux recharges, chaque clé de l'allow-list est
//! distribuée exactement une fois ; la liste restante est toujours un
//! sous-ensemble sans doublon de l'allow-list.

use crate::persistence::PersistenceStore;
use pfcatalog::{MediaCatalog, MediaKey, MediaRecord};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;

/// File de lecture d'un appareil
pub struct DeviceQueue {
    device_id: String,
    /// Allow-list dans l'ordre naturel du scan, sans doublon
    allowed: Vec<MediaKey>,
    allowed_set: HashSet<MediaKey>,
    /// Clés restantes du cycle courant, dépilées par la queue
    remaining: Vec<MediaKey>,
    shuffle: bool,
    refills: u64,
    store: Arc<PersistenceStore>,
}

fn dedup_keys(keys: Vec<MediaKey>) -> (Vec<MediaKey>, HashSet<MediaKey>) {
    let mut set = HashSet::with_capacity(keys.len());
    let mut ordered = Vec::with_capacity(keys.len());
    for key in keys {
        if set.insert(key.clone()) {
            ordered.push(key);
        }
    }
    (ordered, set)
}

impl DeviceQueue {
    /// Crée la file d'un appareil, en reprenant l'état persisté s'il existe
    ///
    /// La liste rechargée est filtrée sur l'allow-list courante ; la
    /// recharge n'a lieu que si rien d'utilisable n'a survécu, pour que le
    /// cycle interrompu reprenne où il en était.
    pub fn new(
        device_id: impl Into<String>,
        allowed: Vec<MediaKey>,
        shuffle: bool,
        store: Arc<PersistenceStore>,
    ) -> Self {
        let device_id = device_id.into();
        let (allowed, allowed_set) = dedup_keys(allowed);

        let mut queue = Self {
            device_id,
            allowed,
            allowed_set,
            remaining: Vec::new(),
            shuffle,
            refills: 0,
            store,
        };

        if let Some(saved) = queue.store.load_queue(&queue.device_id) {
            let before = saved.len();
            queue.remaining = saved
                .into_iter()
                .filter(|key| queue.allowed_set.contains(key))
                .collect();
            if queue.remaining.len() < before {
                tracing::debug!(
                    device_id=%queue.device_id,
                    kept = queue.remaining.len(),
                    loaded = before,
                    "Persisted queue filtered to current allow-list"
                );
            }
        }

        if queue.remaining.is_empty() {
            queue.refill();
        } else {
            queue.persist();
        }
        queue
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Taille de l'allow-list courante
    pub fn total(&self) -> usize {
        self.allowed.len()
    }

    /// Nombre d'éléments déjà distribués dans le cycle courant
    pub fn position(&self) -> usize {
        self.total() - self.remaining.len()
    }

    /// Clés restantes du cycle courant (copie)
    pub fn remaining_keys(&self) -> Vec<MediaKey> {
        self.remaining.clone()
    }

    /// Nombre de recharges effectuées depuis la construction
    pub fn refill_count(&self) -> u64 {
        self.refills
    }

    /// Change le mode de distribution (prend effet à la prochaine recharge)
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    fn persist(&self) {
        self.store.save_queue(&self.device_id, &self.remaining);
    }

    /// Installe un cycle neuf depuis l'allow-list
    fn refill(&mut self) {
        if self.shuffle {
            let mut cycle = self.allowed.clone();
            cycle.shuffle(&mut rand::rng());
            self.remaining = cycle;
        } else {
            // Dépilé par la queue : stocké inversé pour servir l'ordre naturel
            self.remaining = self.allowed.iter().rev().cloned().collect();
        }
        self.refills += 1;
        self.persist();
        tracing::debug!(
            device_id=%self.device_id,
            items = self.remaining.len(),
            shuffle = self.shuffle,
            "Queue refilled"
        );
    }

    /// Remplace l'allow-list
    ///
    /// La liste restante est filtrée sur la nouvelle allow-list ; si
    /// l'ensemble a changé ou que rien n'a survécu au filtre, une recharge
    /// immédiate repart sur un cycle neuf (le jeu de travail a changé, la
    /// progression du cycle est abandonnée). Un simple changement d'ordre
    /// de scan, à ensemble égal, ne coûte pas la progression. Retourne
    /// vrai si une recharge a eu lieu.
    pub fn set_allowed_keys(&mut self, keys: Vec<MediaKey>) -> bool {
        let (keys, set) = dedup_keys(keys);
        let changed = set != self.allowed_set;

        self.allowed = keys;
        self.allowed_set = set;
        self.remaining
            .retain(|key| self.allowed_set.contains(key));

        if changed || self.remaining.is_empty() {
            self.refill();
            true
        } else {
            false
        }
    }

    /// Distribue le prochain média valide
    ///
    /// Dépile jusqu'à trouver un enregistrement résoluble qui respecte le
    /// filtre photo ; les clés mortes ou filtrées sont écartées en
    /// silence. À l'épuisement, recharge et réessaie ; une allow-list
    /// vide, ou deux cycles entiers sans résultat valide, donnent None.
    pub fn take_next(&mut self, catalog: &MediaCatalog, only_photo: bool) -> Option<MediaRecord> {
        if only_photo && !catalog.has_photos() {
            tracing::debug!(device_id=%self.device_id, "No photos in catalog");
            return None;
        }

        let mut refill_rounds = 0;
        loop {
            if self.remaining.is_empty() {
                if self.allowed.is_empty() || refill_rounds >= 2 {
                    tracing::warn!(
                        device_id=%self.device_id,
                        allowed = self.allowed.len(),
                        "No dispensable media for device"
                    );
                    return None;
                }
                self.refill();
                refill_rounds += 1;
                continue;
            }

            let key = match self.remaining.pop() {
                Some(key) => key,
                None => continue,
            };
            let record = match catalog.get(&key) {
                Some(record) => record,
                None => continue, // clé morte, écartée sans recharge forcée
            };
            if only_photo && record.is_video() {
                continue;
            }

            self.persist();
            tracing::debug!(
                device_id=%self.device_id,
                position = self.position(),
                total = self.total(),
                rel_path=%record.rel_path,
                "Next media dispensed"
            );
            return Some(record);
        }
    }

    /// Oublie l'état persisté de cette file
    pub fn delete_persisted(&mut self) {
        self.store.delete_queue(&self.device_id);
        self.remaining.clear();
    }
}
