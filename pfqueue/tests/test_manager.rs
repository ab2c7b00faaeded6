use pfcatalog::{DurationProbe, MediaCatalog};
use pfqueue::{DeviceQueueManager, DeviceSettingsPatch, PersistenceStore};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, rel.as_bytes()).unwrap();
}

/// Sonde lente mesurant combien d'appels se chevauchent
struct GaugeProbe {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl DurationProbe for GaugeProbe {
    fn probe(&self, _path: &Path) -> Option<u64> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Some(7)
    }
}

fn create_manager(root: &Path) -> DeviceQueueManager {
    let catalog = Arc::new(MediaCatalog::new(root.join("gallery"), None, None).unwrap());
    let store = Arc::new(PersistenceStore::new(root.join("storage")).unwrap());
    DeviceQueueManager::new(catalog, store)
}

#[tokio::test]
async fn unrestricted_device_draws_from_the_whole_catalog() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");
    write_file(dir.path(), "gallery/trip2019/b.jpg");
    let manager = create_manager(dir.path());

    let next = manager.get_next("dev1").await.unwrap();
    assert!(["a.jpg", "trip2019/b.jpg"].contains(&next.record.rel_path.as_str()));
    // Compteurs absents tant que l'appareil ne les demande pas
    assert!(next.counters.is_none());

    // Le premier contact a créé les préférences par défaut
    let settings = manager.get_device_settings("dev1").unwrap();
    assert_eq!(settings.photo_time, 15);
    assert!(settings.collections.is_none());
}

#[tokio::test]
async fn counters_are_attached_when_requested() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");
    write_file(dir.path(), "gallery/b.jpg");
    let manager = create_manager(dir.path());

    manager.update_device_settings(
        "dev1",
        &DeviceSettingsPatch {
            show_counters: Some(true),
            ..Default::default()
        },
    );

    let next = manager.get_next("dev1").await.unwrap();
    assert_eq!(next.counters, Some((1, 2)));
    let next = manager.get_next("dev1").await.unwrap();
    assert_eq!(next.counters, Some((2, 2)));
}

#[tokio::test]
async fn device_selection_restricts_and_resets() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/trip2019/a.jpg");
    write_file(dir.path(), "gallery/other/b.jpg");
    let manager = create_manager(dir.path());

    manager
        .set_device_collections("dev1", Some(vec!["trip2019".to_string()]))
        .await;
    for _ in 0..4 {
        let next = manager.get_next("dev1").await.unwrap();
        assert_eq!(next.record.collection, "trip2019");
    }

    // Retour explicite aux défauts : tout le catalogue redevient éligible
    manager.set_device_collections("dev1", None).await;
    let mut seen_other = false;
    for _ in 0..8 {
        let next = manager.get_next("dev1").await.unwrap();
        seen_other |= next.record.collection == "other";
    }
    assert!(seen_other);
}

#[tokio::test]
async fn deleted_collection_yields_none_until_reset() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/trip2019/a.jpg");
    write_file(dir.path(), "gallery/other/b.jpg");
    let manager = create_manager(dir.path());

    manager
        .set_device_collections("dev1", Some(vec!["trip2019".to_string()]))
        .await;
    assert!(manager.get_next("dev1").await.is_some());

    fs::remove_dir_all(dir.path().join("gallery/trip2019")).unwrap();
    manager.catalog().sync();

    // La sélection ne résout plus rien : aucun repli silencieux
    assert!(manager.get_next("dev1").await.is_none());

    manager.set_device_collections("dev1", None).await;
    let next = manager.get_next("dev1").await.unwrap();
    assert_eq!(next.record.collection, "other");
}

#[tokio::test]
async fn default_selection_refreshes_follower_queues() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/trip2019/a.jpg");
    write_file(dir.path(), "gallery/trip2019/b.jpg");
    write_file(dir.path(), "gallery/other/c.jpg");
    let manager = create_manager(dir.path());

    // Matérialise la file de l'appareil suiveur
    assert!(manager.get_next("dev1").await.is_some());

    manager
        .set_default_collections(Some(vec!["trip2019".to_string()]))
        .await;
    for _ in 0..6 {
        let next = manager.get_next("dev1").await.unwrap();
        assert_eq!(next.record.collection, "trip2019");
    }

    // Un appareil avec sa propre sélection ignore les défauts
    manager
        .set_device_collections("dev2", Some(vec!["other".to_string()]))
        .await;
    let next = manager.get_next("dev2").await.unwrap();
    assert_eq!(next.record.collection, "other");
}

#[tokio::test]
async fn empty_selection_resets_to_defaults() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");
    let manager = create_manager(dir.path());

    manager
        .set_device_collections("dev1", Some(Vec::new()))
        .await;
    let settings = manager.get_device_settings("dev1").unwrap();
    assert!(settings.collections.is_none());
    assert!(manager.get_next("dev1").await.is_some());
}

#[tokio::test]
async fn delete_device_forgets_settings_and_queue() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");
    let manager = create_manager(dir.path());

    assert!(manager.get_next("dev1").await.is_some());
    assert!(manager.get_device_settings("dev1").is_some());
    assert!(dir.path().join("storage/queue_dev1.json").exists());

    manager.delete_device("dev1").await;
    assert!(manager.get_device_settings("dev1").is_none());
    assert!(!dir.path().join("storage/queue_dev1.json").exists());

    // L'appareil renaît avec les défauts au contact suivant
    assert!(manager.get_next("dev1").await.is_some());
    assert_eq!(
        manager.get_device_settings("dev1").unwrap().photo_time,
        15
    );
}

#[tokio::test]
async fn settings_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");

    {
        let manager = create_manager(dir.path());
        manager.update_device_settings(
            "dev1",
            &DeviceSettingsPatch {
                photo_time: Some(30),
                sequential_mode: Some(true),
                ..Default::default()
            },
        );
        manager
            .set_default_collections(Some(vec!["/".to_string()]))
            .await;
    }

    let revived = create_manager(dir.path());
    let settings = revived.get_device_settings("dev1").unwrap();
    assert_eq!(settings.photo_time, 30);
    assert!(settings.sequential_mode);
    assert_eq!(
        revived.get_default_collections(),
        Some(vec!["/".to_string()])
    );
}

#[tokio::test]
async fn default_selection_can_change_from_a_spawned_task() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/trip2019/a.jpg");
    write_file(dir.path(), "gallery/other/b.jpg");
    let manager = Arc::new(create_manager(dir.path()));

    // Matérialise une file suiveuse avant le changement de défauts
    assert!(manager.get_next("dev1").await.is_some());

    // La mutation doit pouvoir tourner sur une tâche détachée
    let detached = manager.clone();
    tokio::spawn(async move {
        detached
            .set_default_collections(Some(vec!["trip2019".to_string()]))
            .await;
    })
    .await
    .unwrap();

    for _ in 0..4 {
        let next = manager.get_next("dev1").await.unwrap();
        assert_eq!(next.record.collection, "trip2019");
    }
}

#[tokio::test]
async fn queue_validation_runs_once_at_a_time() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.mp4");
    write_file(dir.path(), "gallery/b.mp4");
    write_file(dir.path(), "gallery/c.mp4");

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let catalog = MediaCatalog::new(dir.path().join("gallery"), None, None)
        .unwrap()
        .with_probe(Box::new(GaugeProbe {
            in_flight: in_flight.clone(),
            max_in_flight: max_in_flight.clone(),
            calls: calls.clone(),
        }));
    let store = Arc::new(PersistenceStore::new(dir.path().join("storage")).unwrap());
    let manager = DeviceQueueManager::new(Arc::new(catalog), store);

    // Première distribution : la file naît et lance sa validation de fond
    assert!(manager.get_next("dev1").await.is_some());

    // Épuise le cycle puis force une recharge pendant que la première
    // validation sonde encore : la seconde ne doit pas se superposer
    for _ in 0..3 {
        assert!(manager.get_next("dev1").await.is_some());
    }

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(calls.load(Ordering::SeqCst) >= 1, "validation never ran");
    assert_eq!(
        max_in_flight.load(Ordering::SeqCst),
        1,
        "two validation passes overlapped"
    );
}

#[tokio::test]
async fn record_contact_derives_a_stable_id() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gallery/a.jpg");
    let manager = create_manager(dir.path());

    let id1 = manager.record_contact("Mozilla/5.0", "192.168.1.10");
    let id2 = manager.record_contact("Mozilla/5.0", "192.168.1.10");
    assert_eq!(id1, id2);

    let settings = manager.get_device_settings(&id1).unwrap();
    assert_eq!(settings.user_agent, "Mozilla/5.0");
    assert_eq!(settings.ip_address, "192.168.1.10");
}
