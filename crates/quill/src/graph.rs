//! Relationship graph operations using petgraph.
//!
//! Pure functions over an issue snapshot:
//! - Incoming link lookup
//! - Cycle detection for a proposed link
//! - Full-graph link check (broken links, self links, cycles)
//! - Active blocker resolution
//! - Parent type hierarchy validation
//!
//! Each link kind forms its own graph. Edges point from the issue holding the
//! reference to the referenced issue, so for `parent` an edge runs child ->
//! parent and for `blocked_by` it runs blocked -> blocker.
//!
//! Traversals use explicit stacks and queues; graph depth is bounded only by
//! the number of issues.

use crate::config::StoreConfig;
use crate::domain::{BrokenLink, Cycle, IncomingLink, LinkKind, LinkReport, SelfLink};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use quill_doc::{Issue, IssueId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Directed graph of one link kind.
///
/// Targets that do not exist in the snapshot still get a node, so dangling
/// references are visible to traversals as sinks.
pub struct LinkGraph {
    graph: DiGraph<IssueId, ()>,
    node_map: HashMap<IssueId, NodeIndex>,
}

impl LinkGraph {
    /// Build the graph of `kind` links. Self links are left out.
    pub fn build(issues: &HashMap<IssueId, Issue>, kind: LinkKind) -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            node_map: HashMap::with_capacity(issues.len()),
        };

        for issue in sorted(issues) {
            let from = graph.node(&issue.id);
            for target in kind.targets(issue) {
                if *target == issue.id {
                    continue;
                }
                let to = graph.node(target);
                graph.graph.update_edge(from, to, ());
            }
        }
        graph
    }

    fn node(&mut self, id: &IssueId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(id) {
            return index;
        }
        let index = self.graph.add_node(id.clone());
        self.node_map.insert(id.clone(), index);
        index
    }

    /// Outgoing neighbours of `node`, ordered by ID for deterministic walks.
    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        next.dedup();
        next
    }

    /// Shortest path from `start` to `goal` along existing edges.
    pub fn path(&self, start: &IssueId, goal: &IssueId) -> Option<Vec<IssueId>> {
        let start = *self.node_map.get(start)?;
        let goal = *self.node_map.get(goal)?;

        let mut predecessor: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![self.graph[goal].clone()];
                let mut cursor = goal;
                while let Some(&prev) = predecessor.get(&cursor) {
                    path.push(self.graph[prev].clone());
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.successors(current) {
                if visited.insert(next) {
                    predecessor.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Every distinct cycle, each rotated to start at its smallest member.
    ///
    /// White/gray/black depth-first traversal; a gray neighbour closes a
    /// cycle made of the current path from that neighbour onwards.
    pub fn cycles(&self) -> BTreeSet<Vec<IssueId>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color = vec![Color::White; self.graph.node_count()];
        let mut found = BTreeSet::new();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for root in roots {
            if color[root.index()] != Color::White {
                continue;
            }

            // (node, successors, next successor to visit)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            let mut path: Vec<NodeIndex> = Vec::new();

            color[root.index()] = Color::Gray;
            stack.push((root, self.successors(root), 0));
            path.push(root);

            while let Some((node, successors, cursor)) = stack.last_mut() {
                let Some(&next) = successors.get(*cursor) else {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    path.pop();
                    continue;
                };
                *cursor += 1;

                match color[next.index()] {
                    Color::White => {
                        color[next.index()] = Color::Gray;
                        let next_successors = self.successors(next);
                        stack.push((next, next_successors, 0));
                        path.push(next);
                    }
                    Color::Gray => {
                        if let Some(start) = path.iter().position(|n| *n == next) {
                            let members: Vec<IssueId> = path[start..]
                                .iter()
                                .map(|n| self.graph[*n].clone())
                                .collect();
                            found.insert(canonical_rotation(members));
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        found
    }
}

/// Rotate a cycle so its smallest ID comes first.
fn canonical_rotation(mut members: Vec<IssueId>) -> Vec<IssueId> {
    if let Some(min_pos) = members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
    {
        members.rotate_left(min_pos);
    }
    members
}

fn sorted(issues: &HashMap<IssueId, Issue>) -> Vec<&Issue> {
    let mut all: Vec<&Issue> = issues.values().collect();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    all
}

/// Every issue referencing `target`, tagged with the referencing field.
pub fn find_incoming_links(issues: &HashMap<IssueId, Issue>, target: &IssueId) -> Vec<IncomingLink> {
    let mut incoming: Vec<IncomingLink> = issues
        .values()
        .filter(|issue| issue.linked_ids().any(|linked| linked == target))
        .flat_map(|issue| {
            LinkKind::ALL.into_iter().filter_map(move |kind| {
                kind.targets(issue)
                    .contains(target)
                    .then(|| IncomingLink {
                        from: issue.id.clone(),
                        kind,
                    })
            })
        })
        .collect();
    incoming.sort();
    incoming
}

/// Check whether adding a `kind` link from `from` to `to` would close a cycle.
///
/// Returns the cycle `[from, to, .., from]` if one would form. A link from an
/// issue to itself is reported as `[from, from]`.
pub fn detect_cycle(
    issues: &HashMap<IssueId, Issue>,
    from: &IssueId,
    kind: LinkKind,
    to: &IssueId,
) -> Option<Vec<IssueId>> {
    if from == to {
        return Some(vec![from.clone(), from.clone()]);
    }

    let graph = LinkGraph::build(issues, kind);
    let back = graph.path(to, from)?;

    let mut cycle = Vec::with_capacity(back.len() + 1);
    cycle.push(from.clone());
    cycle.extend(back);
    Some(cycle)
}

/// Full-graph pass over every link kind.
pub fn check_all_links(issues: &HashMap<IssueId, Issue>) -> LinkReport {
    let mut report = LinkReport::default();

    for issue in sorted(issues) {
        for kind in LinkKind::ALL {
            for target in kind.targets(issue) {
                if *target == issue.id {
                    report.self_links.push(SelfLink {
                        id: issue.id.clone(),
                        kind,
                    });
                } else if !issues.contains_key(target) {
                    report.broken.push(BrokenLink {
                        from: issue.id.clone(),
                        kind,
                        target: target.clone(),
                    });
                }
            }
        }
    }

    for kind in LinkKind::ALL {
        let graph = LinkGraph::build(issues, kind);
        report
            .cycles
            .extend(graph.cycles().into_iter().map(|path| Cycle { kind, path }));
    }

    report.broken.sort();
    report.self_links.sort();
    report.self_links.dedup();
    report.cycles.sort();
    report
}

/// Unresolved issues currently blocking `id`.
///
/// A blocker is named either in the issue's own `blocked_by` list or by
/// another issue's `blocking` list. Missing issues and issues in a resolved
/// status never count.
///
/// # Errors
///
/// Returns `Error::IssueNotFound` if `id` is not in the snapshot.
pub fn find_active_blockers(
    issues: &HashMap<IssueId, Issue>,
    id: &IssueId,
    config: &StoreConfig,
) -> Result<Vec<IssueId>> {
    let issue = issues
        .get(id)
        .ok_or_else(|| Error::IssueNotFound(id.clone()))?;

    let mut candidates: BTreeSet<&IssueId> = issue.blocked_by.iter().collect();
    candidates.extend(
        issues
            .values()
            .filter(|other| other.blocking.contains(id))
            .map(|other| &other.id),
    );

    Ok(candidates
        .into_iter()
        .filter(|candidate| *candidate != id)
        .filter(|candidate| {
            issues
                .get(*candidate)
                .is_some_and(|blocker| !config.is_resolved(&blocker.status))
        })
        .cloned()
        .collect())
}

/// Whether `id` has at least one active blocker.
///
/// # Errors
///
/// Returns `Error::IssueNotFound` if `id` is not in the snapshot.
pub fn is_blocked(
    issues: &HashMap<IssueId, Issue>,
    id: &IssueId,
    config: &StoreConfig,
) -> Result<bool> {
    Ok(!find_active_blockers(issues, id, config)?.is_empty())
}

/// Parent types accepted by an issue of `child_type`.
///
/// Unknown types get the most permissive rule.
pub fn allowed_parent_types(child_type: &str) -> &'static [&'static str] {
    match child_type.to_ascii_lowercase().as_str() {
        "milestone" => &[],
        "epic" => &["milestone"],
        "feature" => &["milestone", "epic"],
        _ => &["milestone", "epic", "feature"],
    }
}

/// Check that `parent_id` may become the parent of `issue`.
///
/// # Errors
///
/// - `Error::IssueNotFound` if the parent does not exist
/// - `Error::CycleDetected` if the parent is the issue itself or a descendant
/// - `Error::InvalidParent` if the type hierarchy forbids the pairing
pub fn validate_parent(
    issues: &HashMap<IssueId, Issue>,
    issue: &Issue,
    parent_id: &IssueId,
) -> Result<()> {
    let parent = issues
        .get(parent_id)
        .ok_or_else(|| Error::IssueNotFound(parent_id.clone()))?;

    if let Some(path) = detect_cycle(issues, &issue.id, LinkKind::Parent, parent_id) {
        return Err(Error::CycleDetected {
            kind: LinkKind::Parent,
            path,
        });
    }

    let allowed = allowed_parent_types(&issue.issue_type);
    if !allowed
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&parent.issue_type))
    {
        return Err(Error::InvalidParent {
            child: issue.id.clone(),
            child_type: issue.issue_type.clone(),
            parent_type: parent.issue_type.clone(),
            allowed: allowed.iter().map(|t| (*t).to_string()).collect(),
        });
    }

    Ok(())
}

/// Remove every reference to `target` from `issue`. Returns the number removed.
pub fn strip_links_to(issue: &mut Issue, target: &IssueId) -> usize {
    strip_links(issue, |candidate| candidate == target)
}

/// Remove self references and references to issues not in `issues`.
/// Returns the number removed.
pub fn strip_invalid_links(issue: &mut Issue, issues: &HashMap<IssueId, Issue>) -> usize {
    let own = issue.id.clone();
    strip_links(issue, |candidate| {
        *candidate == own || !issues.contains_key(candidate)
    })
}

fn strip_links(issue: &mut Issue, mut remove: impl FnMut(&IssueId) -> bool) -> usize {
    let mut removed = 0;

    if issue.parent.as_ref().is_some_and(&mut remove) {
        issue.parent = None;
        removed += 1;
    }
    for list in [&mut issue.blocking, &mut issue.blocked_by] {
        let before = list.len();
        list.retain(|id| !remove(id));
        removed += before - list.len();
    }

    removed
}
