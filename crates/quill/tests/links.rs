//! Integration tests for relationship checks and repairs through the store.

mod common;

use common::temp_store;
use quill::{Error, Issue, IssueId, IssueStore, LinkKind, StoreConfig};

async fn create(store: &IssueStore, id: &str, issue_type: &str) -> Issue {
    let mut issue = Issue::new(format!("Issue {id}"));
    issue.id = IssueId::new(id);
    issue.issue_type = issue_type.to_string();
    store.create(issue).await.unwrap()
}

async fn link(store: &IssueStore, from: &str, kind: LinkKind, to: &str) {
    let mut issue = store.get(&IssueId::new(from)).await.unwrap();
    match kind {
        LinkKind::Parent => issue.parent = Some(IssueId::new(to)),
        LinkKind::Blocking => issue.blocking.push(IssueId::new(to)),
        LinkKind::BlockedBy => issue.blocked_by.push(IssueId::new(to)),
    }
    store.update(issue, None).await.unwrap();
}

#[tokio::test]
async fn test_mutual_blocking_reported_as_one_cycle() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    create(&store, "aa", "task").await;
    create(&store, "bb", "task").await;
    link(&store, "bb", LinkKind::Blocking, "aa").await;
    link(&store, "aa", LinkKind::Blocking, "bb").await;

    let report = store.check_all_links().await;
    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].kind, LinkKind::Blocking);
    assert_eq!(
        report.cycles[0].path,
        vec![IssueId::new("aa"), IssueId::new("bb")]
    );
    assert!(report.broken.is_empty());
}

#[tokio::test]
async fn test_detect_cycle_on_blocking_chain() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    for id in ["a", "b", "c"] {
        create(&store, id, "task").await;
    }
    link(&store, "a", LinkKind::Blocking, "b").await;
    link(&store, "b", LinkKind::Blocking, "c").await;

    let path = store
        .detect_cycle(&IssueId::new("c"), LinkKind::Blocking, &IssueId::new("a"))
        .await
        .unwrap();
    assert!(path.len() >= 3);
    assert_eq!(path.first(), Some(&IssueId::new("c")));
    assert_eq!(path.last(), Some(&IssueId::new("c")));
}

#[tokio::test]
async fn test_deleting_sole_blocker_unblocks() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    create(&store, "blocker", "task").await;
    create(&store, "waiting", "task").await;
    link(&store, "waiting", LinkKind::BlockedBy, "blocker").await;

    let waiting = IssueId::new("waiting");
    assert!(store.is_blocked(&waiting).await.unwrap());

    store.delete(&IssueId::new("blocker")).await.unwrap();
    assert!(!store.is_blocked(&waiting).await.unwrap());
}

#[tokio::test]
async fn test_resolved_blockers_do_not_count() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    let mut blocker = create(&store, "blocker", "task").await;
    create(&store, "waiting", "task").await;
    link(&store, "blocker", LinkKind::Blocking, "waiting").await;

    let waiting = IssueId::new("waiting");
    let active = store.find_active_blockers(&waiting).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, IssueId::new("blocker"));

    blocker = store.get(&blocker.id).await.unwrap();
    blocker.status = "done".to_string();
    store.update(blocker, None).await.unwrap();
    assert!(!store.is_blocked(&waiting).await.unwrap());
}

#[tokio::test]
async fn test_remove_links_to_persists() {
    let (dir, store) = temp_store(StoreConfig::default()).await;
    create(&store, "target", "epic").await;
    create(&store, "child", "task").await;
    create(&store, "other", "task").await;
    link(&store, "child", LinkKind::Parent, "target").await;
    link(&store, "other", LinkKind::Blocking, "target").await;
    link(&store, "other", LinkKind::BlockedBy, "target").await;

    let removed = store.remove_links_to(&IssueId::new("target")).await.unwrap();
    assert_eq!(removed, 3);
    assert!(store.find_incoming_links(&IssueId::new("target")).await.is_empty());

    let reopened = IssueStore::open(dir.path(), StoreConfig::default())
        .await
        .unwrap();
    assert!(reopened
        .find_incoming_links(&IssueId::new("target"))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_fix_broken_links() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    create(&store, "keep", "task").await;
    create(&store, "messy", "task").await;
    link(&store, "messy", LinkKind::Blocking, "messy").await;
    link(&store, "messy", LinkKind::Blocking, "ghost").await;
    link(&store, "messy", LinkKind::BlockedBy, "keep").await;

    let report = store.check_all_links().await;
    assert_eq!(report.broken.len(), 1);
    assert_eq!(report.self_links.len(), 1);

    assert_eq!(store.fix_broken_links().await.unwrap(), 2);
    assert!(store.check_all_links().await.is_clean());
    let messy = store.get(&IssueId::new("messy")).await.unwrap();
    assert_eq!(messy.blocked_by, vec![IssueId::new("keep")]);

    assert_eq!(store.fix_broken_links().await.unwrap(), 0);
}

#[tokio::test]
async fn test_validate_parent_through_store() {
    let (_dir, store) = temp_store(StoreConfig::default()).await;
    create(&store, "m1", "milestone").await;
    create(&store, "e1", "epic").await;
    let task = create(&store, "t1", "task").await;
    let milestone = store.get(&IssueId::new("m1")).await.unwrap();

    store
        .validate_parent(&task, &IssueId::new("e1"))
        .await
        .unwrap();
    let err = store
        .validate_parent(&milestone, &IssueId::new("e1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParent { .. }));
}
