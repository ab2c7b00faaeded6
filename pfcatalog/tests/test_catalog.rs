use pfcatalog::{DurationProbe, MediaCatalog, MediaKind};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, rel.as_bytes()).unwrap();
}

fn create_catalog(root: &Path) -> MediaCatalog {
    MediaCatalog::new(
        root,
        Some("_bg.mp4".to_string()),
        Some("uploads_raw".to_string()),
    )
    .unwrap()
}

/// Sonde de test comptant ses appels
struct CountingProbe {
    calls: Arc<AtomicUsize>,
    seconds: Option<u64>,
}

impl DurationProbe for CountingProbe {
    fn probe(&self, _path: &Path) -> Option<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seconds
    }
}

#[test]
fn scan_keeps_only_eligible_files() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.jpg");
    write_file(dir.path(), "b.mp4");
    write_file(dir.path(), "notes.txt");
    write_file(dir.path(), "ambiance_bg.mp4");
    write_file(dir.path(), "uploads_raw/pending.jpg");
    write_file(dir.path(), ".hidden/x.jpg");
    write_file(dir.path(), ".secret.jpg");

    let catalog = create_catalog(dir.path());

    assert_eq!(catalog.len(), 2);
    let kinds: Vec<MediaKind> = catalog
        .keys()
        .iter()
        .map(|k| catalog.get(k).unwrap().kind)
        .collect();
    assert!(kinds.contains(&MediaKind::Photo));
    assert!(kinds.contains(&MediaKind::Video));
}

#[test]
fn sync_returns_newly_minted_keys() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.jpg");

    let catalog = create_catalog(dir.path());
    assert_eq!(catalog.len(), 1);

    // Rien de neuf sans changement sur disque
    assert!(catalog.sync().is_empty());

    write_file(dir.path(), "b.jpg");
    let new_keys = catalog.sync();
    assert_eq!(new_keys.len(), 1);
    assert_eq!(catalog.len(), 2);
}

#[cfg(unix)]
#[test]
fn rename_preserves_key() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "original.jpg");

    let catalog = create_catalog(dir.path());
    let key = catalog.keys().pop().unwrap();

    fs::rename(dir.path().join("original.jpg"), dir.path().join("renamed.jpg")).unwrap();
    let new_keys = catalog.sync();

    // Même fichier physique : clé réutilisée, chemin mis à jour
    assert!(new_keys.is_empty());
    let record = catalog.get(&key).unwrap();
    assert_eq!(record.rel_path, "renamed.jpg");
}

#[cfg(unix)]
#[test]
fn hardlink_and_symlink_collapse_into_one_entry() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.jpg");
    fs::hard_link(dir.path().join("a.jpg"), dir.path().join("b.jpg")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("a.jpg"), dir.path().join("c.jpg")).unwrap();

    let catalog = create_catalog(dir.path());

    assert_eq!(catalog.len(), 1);
    let keys = catalog.get_keys_for_collections(&["/".to_string()]);
    assert_eq!(keys.len(), 1);
}

#[test]
fn collections_are_non_recursive_and_registered_even_empty() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "root.jpg");
    write_file(dir.path(), "trip2019/one.jpg");
    write_file(dir.path(), "trip2019/two.jpg");
    write_file(dir.path(), "trip2019/day1/three.jpg");
    fs::create_dir_all(dir.path().join("empty")).unwrap();

    let catalog = create_catalog(dir.path());
    let tree = catalog.collections_tree();

    let paths: Vec<&str> = tree.iter().map(|c| c.display_path.as_str()).collect();
    assert_eq!(paths, vec!["/", "/empty", "/trip2019", "/trip2019/day1"]);

    let by_id = |id: &str| tree.iter().find(|c| c.id == id).unwrap();
    assert_eq!(by_id("/").files_count, 1);
    assert_eq!(by_id("empty").files_count, 0);
    // Un sous-dossier n'est jamais compté dans son parent
    assert_eq!(by_id("trip2019").files_count, 2);
    assert_eq!(by_id("trip2019/day1").files_count, 1);
    assert_eq!(by_id("trip2019/day1").depth, 2);

    let labels = catalog.collection_labels();
    assert_eq!(labels.get("trip2019/day1").unwrap(), "day1");
}

#[test]
fn deleted_folder_vanishes_from_tree() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "keep.jpg");
    write_file(dir.path(), "trip2019/one.jpg");

    let catalog = create_catalog(dir.path());
    assert!(catalog.collections_tree().iter().any(|c| c.id == "trip2019"));

    fs::remove_dir_all(dir.path().join("trip2019")).unwrap();
    catalog.sync();

    assert!(!catalog.collections_tree().iter().any(|c| c.id == "trip2019"));
    assert!(catalog.get_keys_for_collections(&["trip2019".to_string()]).is_empty());
}

#[test]
fn get_self_heals_after_deletion() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "doomed.jpg");
    write_file(dir.path(), "survivor.jpg");

    let catalog = create_catalog(dir.path());
    let doomed = catalog
        .keys()
        .into_iter()
        .find(|k| catalog.peek(k).unwrap().rel_path == "doomed.jpg")
        .unwrap();

    fs::remove_file(dir.path().join("doomed.jpg")).unwrap();

    // La lecture validée signale l'absence et purge la clé morte
    assert!(catalog.get(&doomed).is_none());
    assert_eq!(catalog.len(), 1);
    assert!(catalog.peek(&doomed).is_none());
}

#[test]
fn keys_for_collections_unions_without_duplicates() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "root.jpg");
    write_file(dir.path(), "trip2019/one.jpg");
    write_file(dir.path(), "trip2019/two.jpg");

    let catalog = create_catalog(dir.path());

    let ids = vec![
        "trip2019".to_string(),
        "/".to_string(),
        "/trip2019/".to_string(), // normalisé vers trip2019
        "nonexistent".to_string(),
    ];
    let keys = catalog.get_keys_for_collections(&ids);

    assert_eq!(keys.len(), 3);
    let unique: std::collections::HashSet<_> = keys.iter().collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn duration_is_probed_once_and_cached_against_stamp() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "movie.mp4");

    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = create_catalog(dir.path()).with_probe(Box::new(CountingProbe {
        calls: calls.clone(),
        seconds: Some(42),
    }));

    let key = catalog.keys().pop().unwrap();
    let record = catalog.get(&key).unwrap();

    assert_eq!(catalog.ensure_duration(&record), 42);
    assert_eq!(catalog.ensure_duration(&record), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Fichier modifié (taille différente) : l'empreinte change, on re-sonde
    fs::write(dir.path().join("movie.mp4"), b"new much longer content").unwrap();
    assert_eq!(catalog.ensure_duration(&record), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn probe_failure_degrades_to_zero() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "movie.mp4");
    write_file(dir.path(), "photo.jpg");

    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = create_catalog(dir.path()).with_probe(Box::new(CountingProbe {
        calls: calls.clone(),
        seconds: None,
    }));

    let video = catalog
        .keys()
        .into_iter()
        .find(|k| catalog.peek(k).unwrap().is_video())
        .unwrap();
    let photo = catalog
        .keys()
        .into_iter()
        .find(|k| !catalog.peek(k).unwrap().is_video())
        .unwrap();

    let video_record = catalog.get(&video).unwrap();
    assert_eq!(catalog.ensure_duration(&video_record), 0);

    // Les photos ne sont jamais sondées
    let photo_record = catalog.get(&photo).unwrap();
    assert_eq!(catalog.ensure_duration(&photo_record), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn photo_partition_tracks_catalog_content() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "movie.mp4");

    let catalog = create_catalog(dir.path());
    assert!(!catalog.has_photos());
    assert!(catalog.random_photo_background().is_none());

    write_file(dir.path(), "photo.jpg");
    catalog.sync();

    assert!(catalog.has_photos());
    assert_eq!(catalog.photo_key_count(), 1);
    assert_eq!(catalog.random_photo_background().unwrap(), "photo.jpg");
}
