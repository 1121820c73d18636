//! Layered (Sugiyama-style) layout of a task graph.
//!
//! Edges run from prerequisite to dependent. Ranks are longest-path distances
//! from the sources; within a rank, nodes are ordered by the mean position of
//! their predecessors. Coordinates are the top-left corner of each node box.

use crate::types::{CompletionSet, Direction, TaskGraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Node box width in pixels.
pub const NODE_WIDTH: f64 = 250.0;

/// Node box height in pixels.
pub const NODE_HEIGHT: f64 = 100.0;

/// Gap between neighbouring nodes of the same rank.
pub const NODE_SEPARATION: f64 = 50.0;

/// Gap between consecutive ranks.
pub const RANK_SEPARATION: f64 = 80.0;

/// A positioned node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: String,
    pub rank: usize,
    /// Position within its rank, 0-based
    pub order: usize,
    pub x: f64,
    pub y: f64,
    pub completed: bool,
}

/// An edge from prerequisite to dependent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub from_id: String,
    pub to_id: String,
}

/// Output of [`layout`]: what a graph surface needs to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutedGraph {
    pub direction: Direction,
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

impl LayoutedGraph {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Number of ranks.
    pub fn rank_count(&self) -> usize {
        self.nodes.iter().map(|n| n.rank + 1).max().unwrap_or(0)
    }

    /// Node ids grouped by rank, each group in within-rank order.
    pub fn ranks(&self) -> Vec<Vec<&LayoutNode>> {
        let mut ranks: Vec<Vec<&LayoutNode>> = vec![Vec::new(); self.rank_count()];
        for node in &self.nodes {
            ranks[node.rank].push(node);
        }
        for rank in &mut ranks {
            rank.sort_by_key(|n| n.order);
        }
        ranks
    }

    /// Bounding box (width, height) of all node boxes.
    pub fn extent(&self) -> (f64, f64) {
        let width = self.nodes.iter().map(|n| n.x + NODE_WIDTH).fold(0.0, f64::max);
        let height = self.nodes.iter().map(|n| n.y + NODE_HEIGHT).fold(0.0, f64::max);
        (width, height)
    }
}

/// Lay out `graph` with nothing marked complete.
pub fn layout(graph: &TaskGraph, direction: Direction) -> LayoutedGraph {
    layout_with_completion(graph, direction, &CompletionSet::new())
}

/// Lay out `graph`, flagging nodes in `completed`.
pub fn layout_with_completion(graph: &TaskGraph, direction: Direction, completed: &CompletionSet) -> LayoutedGraph {
    let ids: Vec<String> = graph.tasks().iter().map(|t| t.key()).collect();
    let edges = collect_edges(graph);

    let mut preds: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &edges {
        preds.entry(edge.to_id.as_str()).or_default().push(edge.from_id.as_str());
    }

    let ranks = assign_ranks(&ids, &preds);
    let orders = order_within_ranks(&ids, &preds, &ranks);

    let mut width_of_rank: HashMap<usize, usize> = HashMap::new();
    for id in &ids {
        *width_of_rank.entry(ranks[id.as_str()]).or_default() += 1;
    }
    let widest = width_of_rank.values().copied().max().unwrap_or(0);

    let nodes = ids
        .iter()
        .map(|id| {
            let rank = ranks[id.as_str()];
            let order = orders[id.as_str()];
            let (x, y) = position(direction, rank, order, width_of_rank[&rank], widest);
            LayoutNode {
                id: id.clone(),
                rank,
                order,
                x,
                y,
                completed: completed.contains(id),
            }
        })
        .collect();

    LayoutedGraph { direction, nodes, edges }
}

/// One edge per (dependency, task) pair whose endpoints both exist, deduplicated.
fn collect_edges(graph: &TaskGraph) -> Vec<LayoutEdge> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();

    for task in graph.tasks() {
        let to_id = task.key();
        for dep in &task.dependencies {
            let from_id = dep.to_string();
            if !graph.contains(&from_id) {
                log::debug!("Dropping dangling dependency {} -> {}", from_id, to_id);
                continue;
            }
            if from_id == to_id {
                continue;
            }
            let edge = LayoutEdge {
                from_id,
                to_id: to_id.clone(),
            };
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
    }

    edges
}

/// Longest-path ranking by iterative DFS over predecessors.
///
/// A predecessor already on the DFS stack closes a cycle; that back-edge does
/// not contribute to rank. Each node is pushed once and each edge examined
/// once, so this runs in O(V + E) whatever the input.
fn assign_ranks<'a>(ids: &'a [String], preds: &HashMap<&'a str, Vec<&'a str>>) -> HashMap<&'a str, usize> {
    let mut rank: HashMap<&str, usize> = HashMap::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    for root in ids {
        let root = root.as_str();
        if rank.contains_key(root) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        on_stack.insert(root);

        while let Some((node, next)) = stack.last_mut() {
            let node_preds = preds.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            if *next < node_preds.len() {
                let pred = node_preds[*next];
                *next += 1;
                if rank.contains_key(pred) {
                    continue;
                }
                if on_stack.contains(pred) {
                    log::debug!("Cycle: ignoring back-edge {} -> {} for ranking", pred, node);
                    continue;
                }
                on_stack.insert(pred);
                stack.push((pred, 0));
            } else {
                let node = *node;
                // Back-edge sources are still on the stack and have no rank yet.
                let r = node_preds
                    .iter()
                    .filter_map(|p| rank.get(p).map(|r| r + 1))
                    .max()
                    .unwrap_or(0);
                rank.insert(node, r);
                on_stack.remove(node);
                stack.pop();
            }
        }
    }

    rank
}

/// Order nodes within each rank by predecessor barycenter, ties broken by id.
fn order_within_ranks<'a>(
    ids: &'a [String],
    preds: &HashMap<&'a str, Vec<&'a str>>,
    ranks: &HashMap<&'a str, usize>,
) -> HashMap<&'a str, usize> {
    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut by_rank: Vec<Vec<&str>> = vec![Vec::new(); max_rank + 1];
    // ids arrive sorted by numeric task id
    for id in ids {
        by_rank[ranks[id.as_str()]].push(id.as_str());
    }

    let mut order: HashMap<&str, usize> = HashMap::new();
    for (r, members) in by_rank.iter().enumerate() {
        let mut keyed: Vec<(f64, usize, &str)> = members
            .iter()
            .enumerate()
            .map(|(tie, id)| {
                let upper: Vec<f64> = preds
                    .get(id)
                    .map(|ps| {
                        ps.iter()
                            .filter(|p| ranks[*p] < r)
                            .filter_map(|p| order.get(p).map(|o| *o as f64))
                            .collect()
                    })
                    .unwrap_or_default();
                let barycenter = if upper.is_empty() {
                    tie as f64
                } else {
                    upper.iter().sum::<f64>() / upper.len() as f64
                };
                (barycenter, tie, *id)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (position, (_, _, id)) in keyed.into_iter().enumerate() {
            order.insert(id, position);
        }
    }

    order
}

/// Top-left corner of a node. Ranks are centred against the widest rank.
fn position(direction: Direction, rank: usize, order: usize, rank_width: usize, widest: usize) -> (f64, f64) {
    let offset = (widest - rank_width) as f64 / 2.0;
    match direction {
        Direction::TopToBottom => {
            let x = (offset + order as f64) * (NODE_WIDTH + NODE_SEPARATION);
            let y = rank as f64 * (NODE_HEIGHT + RANK_SEPARATION);
            (x, y)
        }
        Direction::LeftToRight => {
            let x = rank as f64 * (NODE_WIDTH + RANK_SEPARATION);
            let y = (offset + order as f64) * (NODE_HEIGHT + NODE_SEPARATION);
            (x, y)
        }
    }
}
