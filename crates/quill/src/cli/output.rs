//! Text and JSON rendering for CLI output.
//!
//! Semantic colors:
//!   - cyan: issue IDs
//!   - green: resolved statuses, completed actions
//!   - yellow: in-progress statuses, warnings
//!   - red: blocked statuses, problems
//!   - dimmed: field labels

use crate::config::StoreConfig;
use crate::domain::{EventKind, IssueEvent, LinkReport};
use colored::Colorize;
use quill_doc::Issue;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Write};

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Print a value as pretty JSON to stdout
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(handle, "{json}")
}

/// JSON form of an issue, including the store-owned ID and path.
pub fn issue_json(issue: &Issue) -> Value {
    let mut value = serde_json::to_value(issue).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("id".to_string(), json!(issue.id));
        map.insert("path".to_string(), json!(issue.path.display().to_string()));
        map.insert("body".to_string(), json!(issue.body));
    }
    value
}

/// JSON form of a change event
pub fn event_json(event: &IssueEvent) -> Value {
    json!({
        "kind": event.kind,
        "issue_id": event.issue_id,
        "issue": event.issue.as_ref().map(issue_json),
    })
}

/// JSON form of a link report
pub fn report_json(report: &LinkReport) -> Value {
    json!({
        "broken": report.broken.iter().map(|b| json!({
            "from": b.from,
            "kind": b.kind,
            "target": b.target,
        })).collect::<Vec<_>>(),
        "self_links": report.self_links.iter().map(|s| json!({
            "id": s.id,
            "kind": s.kind,
        })).collect::<Vec<_>>(),
        "cycles": report.cycles.iter().map(|c| json!({
            "kind": c.kind,
            "path": c.path,
        })).collect::<Vec<_>>(),
    })
}

fn colorize_status(status: &str, config: &StoreConfig) -> String {
    if config.is_resolved(status) {
        status.green().to_string()
    } else if status.eq_ignore_ascii_case("blocked") {
        status.red().to_string()
    } else if status.eq_ignore_ascii_case("in-progress") {
        status.yellow().to_string()
    } else {
        status.to_string()
    }
}

/// One-line summary: `id  [status] type  title`
pub fn issue_line(issue: &Issue, config: &StoreConfig) -> String {
    format!(
        "{}  [{}] {}  {}",
        issue.id.as_str().cyan(),
        colorize_status(&issue.status, config),
        issue.issue_type.dimmed(),
        issue.title
    )
}

/// Full multi-line rendering of an issue
pub fn issue_details(issue: &Issue, config: &StoreConfig) -> String {
    let mut out = String::new();
    let mut field = |label: &str, value: String| {
        if !value.is_empty() {
            out.push_str(&format!("{} {value}\n", format!("{label}:").dimmed()));
        }
    };

    field("ID", issue.id.as_str().cyan().bold().to_string());
    field("Title", issue.title.bold().to_string());
    field("Status", colorize_status(&issue.status, config));
    field("Type", issue.issue_type.clone());
    field("Priority", issue.priority.clone());
    field("Tags", issue.tags.join(", "));
    field("Path", issue.path.display().to_string());
    field(
        "Created",
        issue.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
    );
    field(
        "Updated",
        issue.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
    );
    field("Due", issue.due.map(|d| d.to_string()).unwrap_or_default());
    field(
        "Parent",
        issue.parent.as_ref().map(ToString::to_string).unwrap_or_default(),
    );
    field("Blocking", join_ids(&issue.blocking));
    field("Blocked by", join_ids(&issue.blocked_by));

    if !issue.body.trim().is_empty() {
        out.push('\n');
        out.push_str(issue.body.trim_end());
        out.push('\n');
    }
    out
}

fn join_ids(ids: &[quill_doc::IssueId]) -> String {
    ids.iter()
        .map(quill_doc::IssueId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human-readable link report
pub fn report_text(report: &LinkReport) -> String {
    if report.is_clean() {
        return format!("{}\n", "All links are valid".green());
    }

    let mut out = String::new();
    for broken in &report.broken {
        out.push_str(&format!(
            "{} {} {} -> {} (missing)\n",
            "broken".red(),
            broken.from.as_str().cyan(),
            broken.kind,
            broken.target
        ));
    }
    for self_link in &report.self_links {
        out.push_str(&format!(
            "{} {} {} itself\n",
            "self".yellow(),
            self_link.id.as_str().cyan(),
            self_link.kind
        ));
    }
    for cycle in &report.cycles {
        let mut path: Vec<&str> = cycle.path.iter().map(quill_doc::IssueId::as_str).collect();
        if let Some(first) = path.first().copied() {
            path.push(first);
        }
        out.push_str(&format!(
            "{} {}: {}\n",
            "cycle".red(),
            cycle.kind,
            path.join(" -> ")
        ));
    }
    out.push_str(&format!("{} problem(s)\n", report.problem_count()));
    out
}

/// One-line rendering of a change event
pub fn event_line(event: &IssueEvent) -> String {
    let kind = match event.kind {
        EventKind::Created => event.kind.to_string().green(),
        EventKind::Updated => event.kind.to_string().yellow(),
        EventKind::Deleted => event.kind.to_string().red(),
    };
    let title = event
        .issue
        .as_ref()
        .map(|issue| issue.title.as_str())
        .unwrap_or_default();
    format!("{kind:<8} {}  {title}", event.issue_id.as_str().cyan())
}
