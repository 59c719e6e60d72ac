//! Document round trips through the filesystem.

use quill_doc::{etag_of, write_atomic, Issue, IssueId, SyncValue};
use tempfile::TempDir;

#[tokio::test]
async fn test_written_document_hashes_like_rendered_issue() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a").join("a1-b2--first.md");
    tokio::fs::create_dir_all(path.parent().unwrap())
        .await
        .unwrap();

    let mut issue = Issue::new("First");
    issue.status = "open".to_string();
    issue.blocked_by = vec![IssueId::new("z9-z9")];
    issue
        .sync
        .insert("jira".to_string(), SyncValue::from("PROJ-12"));
    issue.body = "Steps to reproduce.\n".to_string();

    write_atomic(&path, &issue.render().unwrap()).await.unwrap();

    let bytes = tokio::fs::read(&path).await.unwrap();
    assert_eq!(etag_of(&bytes), issue.etag().unwrap());

    let parsed = Issue::parse(&bytes).unwrap();
    assert_eq!(parsed.blocked_by, issue.blocked_by);
    assert_eq!(parsed.sync["jira"].as_str(), Some("PROJ-12"));
    assert_eq!(parsed.body, issue.body);
}

#[tokio::test]
async fn test_hand_edit_changes_etag() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("edit.md");

    let issue = Issue::new("Editable");
    write_atomic(&path, &issue.render().unwrap()).await.unwrap();
    let before = etag_of(&tokio::fs::read(&path).await.unwrap());

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    tokio::fs::write(&path, text.replace("Editable", "Edited"))
        .await
        .unwrap();
    let after = etag_of(&tokio::fs::read(&path).await.unwrap());

    assert_ne!(before, after);
    assert_eq!(
        Issue::parse(text.replace("Editable", "Edited").as_bytes())
            .unwrap()
            .title,
        "Edited"
    );
}
