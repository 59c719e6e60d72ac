//! Domain types for the issue store.
//!
//! The issue value type itself lives in `quill-doc`; this module holds the
//! store-side vocabulary built around it: link kinds, change events and the
//! results of link validation.

use quill_doc::{Issue, IssueId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of relationship between two issues.
///
/// All three kinds are hierarchical and therefore cycle-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `parent`: child -> parent
    Parent,

    /// `blocking`: blocker -> blocked issue
    Blocking,

    /// `blocked_by`: blocked issue -> blocker
    BlockedBy,
}

impl LinkKind {
    /// Every link kind, in a fixed order.
    pub const ALL: [LinkKind; 3] = [LinkKind::Parent, LinkKind::Blocking, LinkKind::BlockedBy];

    /// Front-matter field name for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Blocking => "blocking",
            Self::BlockedBy => "blocked_by",
        }
    }

    /// Targets of this kind of link on `issue`.
    pub fn targets(self, issue: &Issue) -> &[IssueId] {
        match self {
            Self::Parent => issue.parent.as_slice(),
            Self::Blocking => &issue.blocking,
            Self::BlockedBy => &issue.blocked_by,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "parent" => Ok(Self::Parent),
            "blocking" => Ok(Self::Blocking),
            "blocked_by" => Ok(Self::BlockedBy),
            other => Err(format!(
                "unknown link kind '{other}' (expected parent, blocking or blocked_by)"
            )),
        }
    }
}

/// What happened to an issue during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A new issue appeared
    Created,

    /// An existing issue changed content or location
    Updated,

    /// An issue disappeared
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// A committed change to the issue set, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueEvent {
    /// What happened
    pub kind: EventKind,

    /// The affected issue
    pub issue_id: IssueId,

    /// The issue after the change; `None` for deletions
    pub issue: Option<Issue>,
}

impl IssueEvent {
    pub(crate) fn created(issue: Issue) -> Self {
        Self {
            kind: EventKind::Created,
            issue_id: issue.id.clone(),
            issue: Some(issue),
        }
    }

    pub(crate) fn updated(issue: Issue) -> Self {
        Self {
            kind: EventKind::Updated,
            issue_id: issue.id.clone(),
            issue: Some(issue),
        }
    }

    pub(crate) fn deleted(issue_id: IssueId) -> Self {
        Self {
            kind: EventKind::Deleted,
            issue_id,
            issue: None,
        }
    }
}

/// An issue that references another one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IncomingLink {
    /// The referencing issue
    pub from: IssueId,

    /// Which field holds the reference
    pub kind: LinkKind,
}

/// A reference to an issue that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BrokenLink {
    /// The issue holding the reference
    pub from: IssueId,

    /// Which field holds the reference
    pub kind: LinkKind,

    /// The missing target
    pub target: IssueId,
}

/// An issue that references itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SelfLink {
    /// The self-referencing issue
    pub id: IssueId,

    /// Which field holds the reference
    pub kind: LinkKind,
}

/// A cycle among links of one kind.
///
/// `path` lists each member once, rotated so the lexicographically smallest
/// ID comes first; the last member links back to the first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycle {
    /// Link kind forming the cycle
    pub kind: LinkKind,

    /// Members of the cycle
    pub path: Vec<IssueId>,
}

/// Result of a full-graph link check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// References to issues that do not exist
    pub broken: Vec<BrokenLink>,

    /// Issues that reference themselves
    pub self_links: Vec<SelfLink>,

    /// Distinct cycles, one per rotation class
    pub cycles: Vec<Cycle>,
}

impl LinkReport {
    /// Whether no problems were found
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty() && self.self_links.is_empty() && self.cycles.is_empty()
    }

    /// Total number of problems found
    pub fn problem_count(&self) -> usize {
        self.broken.len() + self.self_links.len() + self.cycles.len()
    }
}
