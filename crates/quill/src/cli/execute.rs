//! Command execution logic.

use super::output::{self, OutputMode};
use super::{ListArgs, SearchArgs};
use crate::config::StoreConfig;
use crate::layout;
use crate::storage::IssueStore;
use anyhow::{Context, Result};
use colored::Colorize;
use quill_doc::IssueId;
use serde_json::json;
use std::path::Path;

/// Open and load the store at `root`.
pub async fn open_store(root: &Path, config: Option<&Path>) -> Result<IssueStore> {
    let config = match config {
        Some(path) => StoreConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StoreConfig::default(),
    };
    IssueStore::open(root, config)
        .await
        .with_context(|| format!("Failed to open issue store at {}", root.display()))
}

/// Execute the list command
pub async fn list(store: &IssueStore, args: &ListArgs, mode: OutputMode) -> Result<()> {
    let issues: Vec<_> = store
        .all()
        .await
        .into_iter()
        .filter(|issue| layout::is_archived_path(&issue.path) == args.archived)
        .filter(|issue| {
            args.status
                .as_deref()
                .is_none_or(|status| issue.status.eq_ignore_ascii_case(status))
        })
        .filter(|issue| {
            args.issue_type
                .as_deref()
                .is_none_or(|t| issue.issue_type.eq_ignore_ascii_case(t))
        })
        .collect();

    match mode {
        OutputMode::Json => {
            output::print_json(&issues.iter().map(output::issue_json).collect::<Vec<_>>())?;
        }
        OutputMode::Text => {
            if issues.is_empty() {
                println!("No issues found");
            }
            for issue in &issues {
                println!("{}", output::issue_line(issue, store.config()));
            }
        }
    }
    Ok(())
}

/// Execute the show command
pub async fn show(store: &IssueStore, id: &str, mode: OutputMode) -> Result<()> {
    let id = IssueId::new(id);
    let issue = store
        .get(&id)
        .await
        .ok_or_else(|| crate::Error::IssueNotFound(id.clone()))?;

    match mode {
        OutputMode::Json => {
            let mut value = output::issue_json(&issue);
            value["etag"] = json!(store.etag(&id).await?);
            output::print_json(&value)?;
        }
        OutputMode::Text => print!("{}", output::issue_details(&issue, store.config())),
    }
    Ok(())
}

/// Execute the links command
pub async fn links(store: &IssueStore, mode: OutputMode) -> Result<()> {
    let report = store.check_all_links().await;
    match mode {
        OutputMode::Json => output::print_json(&output::report_json(&report))?,
        OutputMode::Text => print!("{}", output::report_text(&report)),
    }
    Ok(())
}

/// Execute the fix-links command
pub async fn fix_links(store: &IssueStore, mode: OutputMode) -> Result<()> {
    let fixed = store.fix_broken_links().await?;
    match mode {
        OutputMode::Json => output::print_json(&json!({ "fixed": fixed }))?,
        OutputMode::Text if fixed == 0 => println!("No broken links"),
        OutputMode::Text => println!("{} {fixed} link(s)", "Removed".green()),
    }
    Ok(())
}

/// Execute the blockers command
pub async fn blockers(store: &IssueStore, id: &str, mode: OutputMode) -> Result<()> {
    let blockers = store.find_active_blockers(&IssueId::new(id)).await?;
    match mode {
        OutputMode::Json => {
            output::print_json(&blockers.iter().map(output::issue_json).collect::<Vec<_>>())?;
        }
        OutputMode::Text if blockers.is_empty() => println!("{id} is not blocked"),
        OutputMode::Text => {
            println!("{} is blocked by:", id.cyan());
            for blocker in &blockers {
                println!("  {}", output::issue_line(blocker, store.config()));
            }
        }
    }
    Ok(())
}

/// Execute the search command
pub async fn search(store: &IssueStore, args: &SearchArgs, mode: OutputMode) -> Result<()> {
    let query = args.query.join(" ");
    let hits = store.search(&query, args.limit).await?;

    let mut issues = Vec::with_capacity(hits.len());
    for id in &hits {
        if let Some(issue) = store.get(id).await {
            issues.push(issue);
        }
    }

    match mode {
        OutputMode::Json => {
            output::print_json(&issues.iter().map(output::issue_json).collect::<Vec<_>>())?;
        }
        OutputMode::Text => {
            if issues.is_empty() {
                println!("No matches for '{query}'");
            }
            for issue in &issues {
                println!("{}", output::issue_line(issue, store.config()));
            }
        }
    }
    Ok(())
}

/// Execute the archive and unarchive commands
pub async fn archive(store: &IssueStore, id: &str, to_archive: bool, mode: OutputMode) -> Result<()> {
    let id = IssueId::new(id);
    let issue = if to_archive {
        store.archive(&id).await?
    } else {
        store.load_and_unarchive(&id).await?
    };

    match mode {
        OutputMode::Json => output::print_json(&output::issue_json(&issue))?,
        OutputMode::Text => println!(
            "{} {} -> {}",
            if to_archive { "Archived" } else { "Restored" }.green(),
            id.as_str().cyan(),
            issue.path.display()
        ),
    }
    Ok(())
}

/// Execute the watch command
pub async fn watch(store: &IssueStore, mode: OutputMode) -> Result<()> {
    let (mut stream, _unsubscribe) = store.subscribe();
    store.start_watching().await?;
    if mode == OutputMode::Text {
        eprintln!(
            "Watching {} ({} issues), press Ctrl-C to stop",
            store.root().display(),
            store.len().await
        );
    }

    loop {
        tokio::select! {
            batch = stream.recv() => {
                let Some(batch) = batch else { break };
                for event in &batch {
                    match mode {
                        OutputMode::Json => println!("{}", output::event_json(event)),
                        OutputMode::Text => println!("{}", output::event_line(event)),
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    store.close().await;
    Ok(())
}
