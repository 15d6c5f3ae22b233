//! Integration tests for the library scanner
//!
//! Covers discovery and filtering, identity-based change detection across
//! rescans, removal of deleted files, and queue enqueueing.

mod common;

use std::fs;

use sqlx::Row;
use tokio_util::sync::CancellationToken;
use tuneforge_worker::error::WorkerError;
use tuneforge_worker::queue::QueueManager;
use tuneforge_worker::scanner::{ScanEvent, ScanMode, Scanner};

use common::{test_pool, write_test_wav};

fn scanner(pool: sqlx::SqlitePool, library: &std::path::Path) -> Scanner {
    Scanner::new(
        pool,
        library.to_path_buf(),
        1024,
        524_288_000,
        4096,
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_full_scan_indexes_audio_files() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();

    write_test_wav(&library.path().join("one.wav"), 440.0);
    write_test_wav(&library.path().join("artist/two.wav"), 880.0);
    fs::write(library.path().join("cover.jpg"), vec![0u8; 5000]).unwrap();

    let summary = scanner(pool.clone(), library.path())
        .scan(ScanMode::Full, &queue)
        .await
        .unwrap();

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.removed, 0);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn test_incremental_rescan_skips_unchanged_files() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();
    write_test_wav(&library.path().join("one.wav"), 440.0);

    let scanner = scanner(pool.clone(), library.path());
    scanner.scan(ScanMode::Full, &queue).await.unwrap();

    // Drain the queue so a spurious re-enqueue would be visible
    let entry = queue.claim_next().await.unwrap().unwrap();
    queue.complete(&entry.file_path).await.unwrap();

    let summary = scanner.scan(ScanMode::Incremental, &queue).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.completed, 1);
}

#[tokio::test]
async fn test_changed_file_is_updated_and_reenqueued() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();
    let path = library.path().join("one.wav");
    write_test_wav(&path, 440.0);

    let scanner = scanner(pool.clone(), library.path());
    scanner.scan(ScanMode::Full, &queue).await.unwrap();
    let entry = queue.claim_next().await.unwrap().unwrap();
    queue.complete(&entry.file_path).await.unwrap();

    // Grow the file so the size component of its identity changes
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0u8; 4096]);
    fs::write(&path, bytes).unwrap();

    let summary = scanner.scan(ScanMode::Incremental, &queue).await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 0);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.pending, 1);
}

#[tokio::test]
async fn test_removed_file_deletes_track_and_queue_entry() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();
    let keep = library.path().join("keep.wav");
    let gone = library.path().join("gone.wav");
    write_test_wav(&keep, 440.0);
    write_test_wav(&gone, 880.0);

    let scanner = scanner(pool.clone(), library.path());
    scanner.scan(ScanMode::Full, &queue).await.unwrap();

    fs::remove_file(&gone).unwrap();
    let summary = scanner.scan(ScanMode::Incremental, &queue).await.unwrap();
    assert_eq!(summary.removed, 1);

    let rows = sqlx::query("SELECT file_path FROM tracks")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let remaining: String = rows[0].get("file_path");
    assert!(remaining.ends_with("keep.wav"));

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.total(), 1);
}

#[tokio::test]
async fn test_undersized_file_is_reported_as_error() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();

    write_test_wav(&library.path().join("one.wav"), 440.0);
    write_test_wav(&library.path().join("two.wav"), 880.0);
    // Well under the 1 KiB minimum
    fs::write(library.path().join("stub.mp3"), vec![0u8; 100]).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let summary = scanner(pool.clone(), library.path())
        .with_events(tx)
        .scan(ScanMode::Full, &queue)
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.errors, 1);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::Error(p) if p.ends_with("stub.mp3"))));
}

#[tokio::test]
async fn test_missing_library_path_errors() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);

    let err = scanner(pool, std::path::Path::new("/does/not/exist"))
        .scan(ScanMode::Full, &queue)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::LibraryNotFound(_)));
}

#[tokio::test]
async fn test_unreadable_tags_fall_back_to_filename_title() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();

    // Big enough to pass the size filter, but not parseable audio
    fs::write(library.path().join("Mystery Song.mp3"), vec![0xFFu8; 2048]).unwrap();

    let summary = scanner(pool.clone(), library.path())
        .scan(ScanMode::Full, &queue)
        .await
        .unwrap();
    assert_eq!(summary.inserted, 1);

    let title: String = sqlx::query("SELECT title FROM tracks")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("title");
    assert_eq!(title, "Mystery Song");
}

#[tokio::test]
async fn test_scan_emits_per_file_events() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();
    let keep = library.path().join("keep.wav");
    let gone = library.path().join("gone.wav");
    write_test_wav(&keep, 440.0);
    write_test_wav(&gone, 880.0);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let scanner = scanner(pool.clone(), library.path()).with_events(tx);
    scanner.scan(ScanMode::Full, &queue).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, ScanEvent::Inserted(_))));

    fs::remove_file(&gone).unwrap();
    scanner.scan(ScanMode::Incremental, &queue).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::Skipped(p) if p.ends_with("keep.wav"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, ScanEvent::Removed(p) if p.ends_with("gone.wav"))));
}

#[tokio::test]
async fn test_cancelled_scan_stops_early() {
    let pool = test_pool().await;
    let queue = QueueManager::new(pool.clone(), 3, 1800);
    let library = tempfile::tempdir().unwrap();
    write_test_wav(&library.path().join("one.wav"), 440.0);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let scanner = Scanner::new(
        pool.clone(),
        library.path().to_path_buf(),
        1024,
        524_288_000,
        4096,
        cancel,
    );

    let summary = scanner.scan(ScanMode::Full, &queue).await.unwrap();
    assert_eq!(summary.inserted, 0);
}
