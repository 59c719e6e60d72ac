//! The issue document: a markdown body under a YAML front-matter header.
//!
//! # Format
//!
//! ```text
//! ---
//! title: Fix the flux capacitor
//! status: open
//! type: bug
//! priority: high
//! tags:
//! - hardware
//! created: 2024-05-01T10:00:00Z
//! updated: 2024-05-01T10:00:00Z
//! blocking:
//! - q7k-m2x
//! ---
//! Markdown body goes here.
//! ```
//!
//! The issue ID and its location are not stored in the document. Both are
//! derived from the file name and directory by the store that owns the file.
//!
//! Rendering is canonical: empty optional fields are omitted and maps are
//! ordered, so the same issue always renders to the same bytes. The
//! [`Issue::etag`] digest relies on that.

use crate::error::{Error, Result};
use crate::sync::SyncData;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;

const DELIMITER: &str = "---";

/// Unique identifier for an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub String);

impl IssueId {
    /// Create a new issue ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is unset
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for IssueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IssueId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// An issue as stored in a markdown file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier, derived from the file name
    #[serde(skip)]
    pub id: IssueId,

    /// Location relative to the store root, owned by the store
    #[serde(skip)]
    pub path: PathBuf,

    /// Issue title
    #[serde(default)]
    pub title: String,

    /// Workflow status (e.g. `open`, `done`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    /// Issue type (e.g. `task`, `epic`)
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub issue_type: String,

    /// Priority (e.g. `high`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Creation timestamp
    #[serde(rename = "created", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last content update timestamp
    #[serde(rename = "updated", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Due date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,

    /// Parent issue in the type hierarchy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueId>,

    /// Issues this issue blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<IssueId>,

    /// Issues blocking this issue
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<IssueId>,

    /// Per-integration sync bookkeeping
    #[serde(default, skip_serializing_if = "SyncData::is_empty")]
    pub sync: SyncData,

    /// Markdown body
    #[serde(skip)]
    pub body: String,
}

impl Issue {
    /// Create an issue with the given title and every other field empty.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Parse a document into an issue.
    ///
    /// The returned issue has an empty `id` and `path`; the caller assigns both
    /// from the file's location.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUtf8` if the bytes are not UTF-8
    /// - `Error::MissingFrontMatter` / `Error::UnterminatedFrontMatter` for a
    ///   malformed header
    /// - `Error::Yaml` if the header is not a valid issue mapping
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        let text = text.replace("\r\n", "\n");
        let (header, body) = split_front_matter(&text)?;

        let mut issue: Issue = if header.trim().is_empty() {
            Issue::default()
        } else {
            serde_yaml::from_str(header)?
        };
        issue.body = body.to_string();
        Ok(issue)
    }

    /// Render the issue to its canonical document form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Yaml` if the header cannot be serialized.
    pub fn render(&self) -> Result<Vec<u8>> {
        let header = serde_yaml::to_string(self)?;
        let mut out = String::with_capacity(header.len() + self.body.len() + 8);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&header);
        if !header.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        Ok(out.into_bytes())
    }

    /// Content hash of the rendered document, as 64 lowercase hex digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue cannot be rendered.
    pub fn etag(&self) -> Result<String> {
        Ok(etag_of(&self.render()?))
    }

    /// Every issue ID this issue references through `parent`, `blocking` or
    /// `blocked_by`.
    pub fn linked_ids(&self) -> impl Iterator<Item = &IssueId> {
        self.parent
            .iter()
            .chain(self.blocking.iter())
            .chain(self.blocked_by.iter())
    }
}

/// Hex SHA-256 digest of raw document bytes.
pub fn etag_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Split `text` into (front matter, body).
fn split_front_matter(text: &str) -> Result<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| (text == DELIMITER).then_some(""))
        .ok_or(Error::MissingFrontMatter)?;

    // Empty header: the closing delimiter follows immediately.
    if let Some(body) = rest.strip_prefix("---\n") {
        return Ok(("", body));
    }
    if rest == DELIMITER {
        return Ok(("", ""));
    }

    if let Some(end) = rest.find("\n---\n") {
        return Ok((&rest[..=end], &rest[end + 5..]));
    }
    if let Some(header) = rest.strip_suffix("\n---") {
        return Ok((header, ""));
    }

    Err(Error::UnterminatedFrontMatter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncValue;
    use chrono::TimeZone;
    use rstest::rstest;

    fn sample() -> Issue {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut issue = Issue::new("Fix the flux capacitor");
        issue.status = "open".to_string();
        issue.issue_type = "bug".to_string();
        issue.priority = "high".to_string();
        issue.tags = vec!["hardware".to_string()];
        issue.created_at = Some(ts);
        issue.updated_at = Some(ts);
        issue.blocking = vec![IssueId::new("q7k-m2x")];
        issue.body = "Needs 1.21 gigawatts.\n".to_string();
        issue
    }

    #[test]
    fn test_render_then_parse_preserves_fields() {
        let issue = sample();
        let parsed = Issue::parse(&issue.render().unwrap()).unwrap();
        assert_eq!(parsed, issue);
    }

    #[test]
    fn test_render_omits_empty_fields() {
        let rendered = String::from_utf8(Issue::new("Bare").render().unwrap()).unwrap();
        assert_eq!(rendered, "---\ntitle: Bare\n---\n");
    }

    #[test]
    fn test_parse_hand_written_document() {
        let doc = "---\ntitle: Hand written\ntype: epic\nblocked_by: [abc-def]\nsync:\n  github:\n    number: 12\n---\n# Heading\n\nText\n";
        let issue = Issue::parse(doc.as_bytes()).unwrap();

        assert_eq!(issue.title, "Hand written");
        assert_eq!(issue.issue_type, "epic");
        assert_eq!(issue.blocked_by, vec![IssueId::new("abc-def")]);
        assert_eq!(
            issue.sync["github"].get("number"),
            Some(&SyncValue::Integer(12))
        );
        assert_eq!(issue.body, "# Heading\n\nText\n");
        assert!(issue.id.is_empty());
        assert!(issue.created_at.is_none());
    }

    #[test]
    fn test_parse_crlf_document() {
        let doc = "---\r\ntitle: Windows\r\n---\r\nbody\r\n";
        let issue = Issue::parse(doc.as_bytes()).unwrap();
        assert_eq!(issue.title, "Windows");
        assert_eq!(issue.body, "body\n");
    }

    #[rstest]
    #[case("---\n---\nbody", "body")]
    #[case("---\n---\n", "")]
    #[case("---\ntitle: x\n---", "")]
    fn test_parse_edge_delimiters(#[case] doc: &str, #[case] body: &str) {
        let issue = Issue::parse(doc.as_bytes()).unwrap();
        assert_eq!(issue.body, body);
    }

    #[test]
    fn test_body_containing_delimiter_is_kept() {
        let mut issue = sample();
        issue.body = "before\n---\nafter\n".to_string();
        let parsed = Issue::parse(&issue.render().unwrap()).unwrap();
        assert_eq!(parsed.body, "before\n---\nafter\n");
    }

    #[rstest]
    #[case("no header at all")]
    #[case("title: x\n---\n")]
    fn test_missing_front_matter(#[case] doc: &str) {
        let err = Issue::parse(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MissingFrontMatter));
    }

    #[test]
    fn test_unterminated_front_matter() {
        let err = Issue::parse(b"---\ntitle: x\nbody").unwrap_err();
        assert!(matches!(err, Error::UnterminatedFrontMatter));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = Issue::parse(b"---\ntitle: [unclosed\n---\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let err = Issue::parse(&[b'-', b'-', b'-', b'\n', 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8(_)));
    }

    #[test]
    fn test_etag_is_stable_and_content_sensitive() {
        let issue = sample();
        let etag = issue.etag().unwrap();
        assert_eq!(etag.len(), 64);
        assert!(etag.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(etag, issue.clone().etag().unwrap());

        let mut changed = issue.clone();
        changed.title.push('!');
        assert_ne!(etag, changed.etag().unwrap());
    }

    #[test]
    fn test_etag_ignores_id_and_path() {
        let mut a = sample();
        let mut b = sample();
        a.id = IssueId::new("aaa-aaa");
        b.path = PathBuf::from("b/bbb-bbb.md");
        assert_eq!(a.etag().unwrap(), b.etag().unwrap());
    }

    #[test]
    fn test_linked_ids() {
        let mut issue = sample();
        issue.parent = Some(IssueId::new("p01-p01"));
        issue.blocked_by = vec![IssueId::new("b01-b01")];

        let linked: Vec<&str> = issue.linked_ids().map(IssueId::as_str).collect();
        assert_eq!(linked, vec!["p01-p01", "q7k-m2x", "b01-b01"]);
    }
}
