//! Journal durability across process restarts.

use std::path::PathBuf;
use std::time::Duration;

use media_relay_storage::{Journal, JournalSettings, PeriodicSave};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn fast_settings() -> JournalSettings {
    JournalSettings {
        save_interval_ms: 0,
        periodic_interval_ms: 20,
        batch_threshold: 0,
    }
}

#[tokio::test]
async fn test_concurrent_marks_survive_flush() {
    let dir: TempDir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("journal.json");
    let journal: Journal = Journal::new(&path, JournalSettings::default());

    let mut handles = Vec::new();
    for worker in 0..8 {
        let journal: Journal = journal.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                journal.mark_uploaded(&format!("w{}/f{}.jpg", worker, i), "takeout-001");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    journal.flush().await.unwrap();

    let reloaded: Journal = Journal::new(&path, JournalSettings::default());
    assert_eq!(reloaded.load().await.unwrap(), 400);
    assert!(reloaded.is_uploaded("w7/f49.jpg"));
}

#[tokio::test]
async fn test_background_saver_persists_without_flush() {
    let dir: TempDir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("journal.json");
    let cancel: CancellationToken = CancellationToken::new();

    let journal: Journal = Journal::new(&path, fast_settings());
    let saver: PeriodicSave = journal.start_periodic_save(&cancel);
    journal.mark_uploaded("a.jpg", "t1");
    journal.mark_uploaded("b.jpg", "t1");
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Simulate a crash: the saver goes away without a final flush.
    drop(saver);
    drop(journal);

    let restarted: Journal = Journal::new(&path, fast_settings());
    assert_eq!(restarted.load().await.unwrap(), 2);
    assert_eq!(restarted.list_completed(), vec!["a.jpg", "b.jpg"]);
}

#[tokio::test]
async fn test_flush_leaves_no_temporary_file() {
    let dir: TempDir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("nested").join("journal.json");
    let journal: Journal = Journal::new(&path, JournalSettings::default());
    journal.mark_uploaded("a.jpg", "t1");
    journal.flush().await.unwrap();
    journal.mark_uploaded("b.jpg", "t1");
    journal.flush().await.unwrap();

    let names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["journal.json"]);
}

#[tokio::test]
async fn test_clear_then_restart_is_fresh() {
    let dir: TempDir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("journal.json");
    let journal: Journal = Journal::new(&path, JournalSettings::default());
    journal.mark_uploaded("a.jpg", "t1");
    journal.flush().await.unwrap();
    journal.clear().await.unwrap();

    let restarted: Journal = Journal::new(&path, JournalSettings::default());
    assert_eq!(restarted.load().await.unwrap(), 0);
    assert!(!restarted.is_uploaded("a.jpg"));
}
