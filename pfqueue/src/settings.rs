//! Préférences par appareil

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Préférences d'un appareil de diffusion
///
/// Créées avec les valeurs par défaut au premier contact d'un identifiant
/// d'appareil, persistées à chaque modification. La sélection de
/// collections est à part : `None` signifie « suivre la sélection par
/// défaut du processus », et elle ne se modifie que par
/// `DeviceQueueManager::set_device_collections` car elle invalide la file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Durée d'affichage d'une photo, en secondes
    pub photo_time: u64,
    /// Ne diffuser que des photos
    pub only_photo: bool,
    /// Ordre séquentiel plutôt que mélangé
    pub sequential_mode: bool,
    /// Afficher les compteurs position/total
    pub show_counters: bool,
    /// Fond vidéo activé
    pub video_background: bool,
    /// Collections actives (None = défauts du processus)
    pub collections: Option<Vec<String>>,
    /// Dernier user-agent observé
    pub user_agent: String,
    /// Dernière adresse IP observée
    pub ip_address: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            photo_time: 15,
            only_photo: false,
            sequential_mode: false,
            show_counters: false,
            video_background: false,
            collections: None,
            user_agent: String::new(),
            ip_address: String::new(),
        }
    }
}

/// Mise à jour partielle des préférences
///
/// Seuls les champs renseignés sont appliqués. La sélection de collections
/// n'en fait volontairement pas partie.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceSettingsPatch {
    pub photo_time: Option<u64>,
    pub only_photo: Option<bool>,
    pub sequential_mode: Option<bool>,
    pub show_counters: Option<bool>,
    pub video_background: Option<bool>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl DeviceSettings {
    /// Applique une mise à jour partielle, retourne vrai si quelque chose a changé
    pub fn apply(&mut self, patch: &DeviceSettingsPatch) -> bool {
        let before = self.clone();

        if let Some(v) = patch.photo_time {
            self.photo_time = v;
        }
        if let Some(v) = patch.only_photo {
            self.only_photo = v;
        }
        if let Some(v) = patch.sequential_mode {
            self.sequential_mode = v;
        }
        if let Some(v) = patch.show_counters {
            self.show_counters = v;
        }
        if let Some(v) = patch.video_background {
            self.video_background = v;
        }
        if let Some(v) = &patch.user_agent {
            self.user_agent = v.clone();
        }
        if let Some(v) = &patch.ip_address {
            self.ip_address = v.clone();
        }

        *self != before
    }
}

/// Dérive un identifiant d'appareil stable depuis le user-agent et l'IP
///
/// UUID v5 sur l'espace de noms DNS : le même couple produit toujours le
/// même identifiant, sans état côté serveur.
pub fn derive_device_id(user_agent: &str, ip_address: &str) -> String {
    let name = format!("{}{}", user_agent, ip_address);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_json() {
        let settings = DeviceSettings {
            photo_time: 30,
            only_photo: true,
            collections: Some(vec!["trip2019".to_string()]),
            ..Default::default()
        };

        let json = serde_json::to_string(&settings).unwrap();
        let back: DeviceSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let back: DeviceSettings = serde_json::from_str("{\"only_photo\": true}").unwrap();
        assert!(back.only_photo);
        assert_eq!(back.photo_time, 15);
        assert!(back.collections.is_none());
    }

    #[test]
    fn patch_reports_changes() {
        let mut settings = DeviceSettings::default();
        let patch = DeviceSettingsPatch {
            sequential_mode: Some(true),
            ..Default::default()
        };
        assert!(settings.apply(&patch));
        assert!(!settings.apply(&patch));
        assert!(settings.sequential_mode);
    }

    #[test]
    fn device_id_derivation_is_stable() {
        let a = derive_device_id("Mozilla/5.0", "192.168.1.10");
        let b = derive_device_id("Mozilla/5.0", "192.168.1.10");
        let c = derive_device_id("Mozilla/5.0", "192.168.1.11");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
