//! Integration tests for the issue store: persistence, ETags and archiving.

mod common;

use chrono::{TimeZone, Utc};
use common::{doc, temp_store, write_file};
use quill::{Error, Issue, IssueId, IssueStore, StoreConfig, SyncValue};
use std::path::PathBuf;

#[tokio::test]
async fn test_created_issues_survive_reopen() {
    let (dir, store) = temp_store(StoreConfig::default()).await;

    let mut first = Issue::new("First issue");
    first.tags = vec!["backend".to_string()];
    first.body = "Some details.\n".to_string();
    let first = store.create(first).await.unwrap();
    let second = store.create(Issue::new("Second issue")).await.unwrap();
    assert_ne!(first.id, second.id);

    let reopened = IssueStore::open(dir.path(), StoreConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.len().await, 2);
    assert_eq!(reopened.get(&first.id).await.unwrap(), first);
    assert_eq!(
        reopened.etag(&first.id).await.unwrap(),
        store.etag(&first.id).await.unwrap()
    );
}

#[tokio::test]
async fn test_load_applies_defaults_and_includes_archive() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    write_file(dir.path(), "a/a1-a1--hand-written.md", &doc("Hand written", ""));
    write_file(dir.path(), "archive/z9-z9.md", &doc("Old", "status: done\n"));
    write_file(dir.path(), "a/readme.txt", "not an issue");

    assert_eq!(store.load().await.unwrap(), 2);

    let active = store.get(&IssueId::new("a1-a1")).await.unwrap();
    assert_eq!(active.issue_type, "task");
    assert_eq!(active.status, "open");
    assert!(active.created_at.is_some());
    assert_eq!(active.path, PathBuf::from("a/a1-a1--hand-written.md"));

    assert!(store.is_archived(&IssueId::new("z9-z9")).await.unwrap());
    assert!(!store.is_archived(&IssueId::new("a1-a1")).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_id_prefers_active_copy() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    write_file(dir.path(), "archive/d1-d1.md", &doc("Archived copy", ""));
    write_file(dir.path(), "d/d1-d1.md", &doc("Active copy", ""));

    store.load().await.unwrap();
    let issue = store.get(&IssueId::new("d1-d1")).await.unwrap();
    assert_eq!(issue.title, "Active copy");
}

#[tokio::test]
async fn test_load_fails_on_unparseable_file_and_keeps_snapshot() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    let kept = store.create(Issue::new("Kept")).await.unwrap();
    write_file(dir.path(), "b/b1-b1.md", "---\ntitle: [unclosed\n---\n");

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(store.get(&kept.id).await.is_some());
}

#[tokio::test]
async fn test_update_with_current_and_stale_etag() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    let created = store.create(Issue::new("Versioned")).await.unwrap();
    let etag = store.etag(&created.id).await.unwrap();

    let mut edit = created.clone();
    edit.status = "in-progress".to_string();
    let updated = store.update(edit, Some(&etag)).await.unwrap();
    assert_eq!(updated.status, "in-progress");

    let mut stale = created.clone();
    stale.status = "done".to_string();
    let err = store.update(stale, Some(&etag)).await.unwrap_err();
    assert!(err.is_conflict());
    match err {
        Error::ETagMismatch { provided, current } => {
            assert_eq!(provided, etag);
            assert_eq!(current, store.etag(&created.id).await.unwrap());
        }
        other => panic!("expected ETagMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_etag_compares_against_disk() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    let created = store.create(Issue::new("Shared")).await.unwrap();
    let etag = store.etag(&created.id).await.unwrap();

    // Another process edits the file; the snapshot has not caught up.
    let path = dir.path().join(&created.path);
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("status: open", "status: done")).unwrap();

    let err = store.update(created, Some(&etag)).await.unwrap_err();
    assert!(matches!(err, Error::ETagMismatch { .. }));
}

#[tokio::test]
async fn test_require_if_match() {
    let mut config = StoreConfig::default();
    config.require_if_match = true;
    let (_dir, store) = temp_store(config).await;
    let created = store.create(Issue::new("Guarded")).await.unwrap();

    for if_match in [None, Some("")] {
        let err = store.update(created.clone(), if_match).await.unwrap_err();
        assert!(matches!(err, Error::ETagRequired));
    }

    let etag = store.etag(&created.id).await.unwrap();
    store.update(created, Some(&etag)).await.unwrap();
}

#[tokio::test]
async fn test_update_unknown_issue() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    let mut ghost = Issue::new("Ghost");
    ghost.id = IssueId::new("g0-g0");

    assert!(store.update(ghost, None).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_update_stamps_time_but_sync_only_does_not() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    let created = store.create(Issue::new("Synced")).await.unwrap();
    let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

    let mut sync_edit = created.clone();
    sync_edit.updated_at = Some(old);
    sync_edit
        .sync
        .insert("github".to_string(), SyncValue::from("42"));
    let saved = store.save_sync_only(sync_edit, None).await.unwrap();
    assert_eq!(saved.updated_at, Some(old));
    assert_eq!(
        store.get(&created.id).await.unwrap().sync["github"].as_str(),
        Some("42")
    );

    let touched = store.update(saved, None).await.unwrap();
    assert!(touched.updated_at.unwrap() > old);
}

#[tokio::test]
async fn test_delete_removes_file_and_entry() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    let created = store.create(Issue::new("Short lived")).await.unwrap();

    store.delete(&created.id).await.unwrap();
    assert!(!dir.path().join(&created.path).exists());
    assert!(store.get(&created.id).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_archive_twice_and_unarchive_twice() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    let created = store.create(Issue::new("Shelved")).await.unwrap();
    let original = created.path.clone();

    let archived = store.archive(&created.id).await.unwrap();
    let again = store.archive(&created.id).await.unwrap();
    assert_eq!(archived.path, again.path);
    assert!(dir.path().join(&archived.path).exists());

    let restored = store.unarchive(&created.id).await.unwrap();
    let again = store.unarchive(&created.id).await.unwrap();
    assert_eq!(restored.path, original);
    assert_eq!(again.path, original);
    assert!(dir.path().join(&original).exists());
    assert!(!dir.path().join(&archived.path).exists());
}

#[tokio::test]
async fn test_get_from_archive_reads_disk() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    write_file(dir.path(), "archive/q1-q1--late.md", &doc("Late arrival", ""));

    let issue = store.get_from_archive(&IssueId::new("q1-q1")).await.unwrap();
    assert_eq!(issue.title, "Late arrival");
    assert!(store.get(&IssueId::new("q1-q1")).await.is_none());

    assert!(store
        .get_from_archive(&IssueId::new("nope"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_load_and_unarchive_restores_unloaded_issue() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    write_file(dir.path(), "archive/Q2-q2--late.md", &doc("Late arrival", ""));

    let restored = store
        .load_and_unarchive(&IssueId::new("Q2-q2"))
        .await
        .unwrap();
    assert_eq!(restored.path, PathBuf::from("q/Q2-q2--late.md"));
    assert!(dir.path().join("q/Q2-q2--late.md").exists());
    assert!(!store.is_archived(&restored.id).await.unwrap());

    assert!(store
        .load_and_unarchive(&IssueId::new("missing"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_search_builds_lazily_and_tracks_writes() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    let login = store.create(Issue::new("Login page broken")).await.unwrap();
    store.create(Issue::new("Unrelated")).await.unwrap();

    assert_eq!(store.search("login", 10).await.unwrap(), vec![login.id.clone()]);

    let later = store.create(Issue::new("Second login bug")).await.unwrap();
    let hits = store.search("login", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.contains(&later.id));

    store.delete(&login.id).await.unwrap();
    assert_eq!(store.search("login", 10).await.unwrap(), vec![later.id]);
}

#[tokio::test]
async fn test_reload_drops_vanished_issues_from_search() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    let vanishing = store.create(Issue::new("Vanishing widget")).await.unwrap();
    let staying = store.create(Issue::new("Staying widget")).await.unwrap();
    assert_eq!(store.search("widget", 10).await.unwrap().len(), 2);

    std::fs::remove_file(dir.path().join(&vanishing.path)).unwrap();
    assert_eq!(store.load().await.unwrap(), 1);

    assert_eq!(store.search("widget", 10).await.unwrap(), vec![staying.id]);
    assert!(store.search("vanishing", 10).await.unwrap().is_empty());
}
