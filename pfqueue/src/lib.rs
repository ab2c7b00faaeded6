//! # pfqueue - Files de lecture par appareil de PFrame
//!
//! Cette crate orchestre la diffusion par appareil au-dessus du catalogue :
//! - Une file par appareil : permutation sans remise de son allow-list,
//!   rechargée à l'épuisement (mélangée ou séquentielle)
//! - Préférences par appareil (durée photo, filtre photo, compteurs,
//!   sélection de collections) créées au premier contact
//! - Sélection de collections par défaut du processus, suivie par les
//!   appareils sans sélection propre
//! - Persistance à plat : un fichier JSON par entité, écrit après chaque
//!   mutation, pour reprendre les cycles au redémarrage
//! - Validation de fond après recharge : clés mortes purgées, durées vidéo
//!   pré-chauffées, au plus une tâche en vol par appareil
//!
//! # Architecture
//!
//! - **DeviceQueueManager** : service construit explicitement, sans
//!   singleton ; seule porte d'entrée des consommateurs
//! - **DeviceQueue** : la mécanique de cycle d'un appareil
//! - **PersistenceStore** : dépôt des états persistés
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use pfcatalog::MediaCatalog;
//! use pfqueue::{DeviceQueueManager, PersistenceStore};
//! use std::sync::Arc;
//!
//! # async fn demo() -> pfqueue::Result<()> {
//! let catalog = Arc::new(MediaCatalog::new("gallery", None, None)?);
//! let store = Arc::new(PersistenceStore::new("storage")?);
//! let manager = DeviceQueueManager::new(catalog, store);
//!
//! let device_id = manager.record_contact("Mozilla/5.0", "192.168.1.10");
//! if let Some(next) = manager.get_next(&device_id).await {
//!     println!("-> {}", next.record.rel_path);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod manager;
mod persistence;
mod queue;
mod settings;

#[cfg(feature = "pfconfig")]
mod config_ext;

// Réexports publics
pub use error::{Error, Result};
pub use manager::{DeviceQueueManager, NextMedia};
pub use persistence::PersistenceStore;
pub use queue::DeviceQueue;
pub use settings::{derive_device_id, DeviceSettings, DeviceSettingsPatch};

#[cfg(feature = "pfconfig")]
pub use config_ext::QueueConfigExt;
