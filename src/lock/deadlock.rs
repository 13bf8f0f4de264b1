// ABOUTME: Wait-for-graph cycle detection for deadlock diagnosis.
// ABOUTME: Explicit-stack DFS; reports the first cycle found in dependency order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Result of a deadlock query. `cycle` is non-empty exactly when
/// `has_cycle` is true, listing the agents in dependency order: each agent
/// waits on the next, and the last waits on the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlockReport {
    pub has_cycle: bool,
    pub cycle: Vec<u32>,
}

impl DeadlockReport {
    /// Wrap a raw cycle into the public report shape.
    pub fn from_cycle(cycle: Vec<u32>) -> Self {
        Self {
            has_cycle: !cycle.is_empty(),
            cycle,
        }
    }
}

struct Frame {
    node: u32,
    neighbors: Vec<u32>,
    next: usize,
}

/// Find a cycle in a wait-for graph, where an edge `a -> b` means agent `a`
/// is blocked waiting on a resource held by agent `b`.
///
/// Depth-first search with an explicit stack standing in for recursion. The
/// first back edge (an edge into a node still on the current path)
/// identifies the cycle, which is returned as the path segment from that
/// node to the top of the stack. Returns an empty vec for an acyclic graph.
/// Disconnected graphs are handled by restarting from every unvisited node;
/// traversal order is sorted for deterministic results.
pub fn find_cycle(deps: &HashMap<u32, HashSet<u32>>) -> Vec<u32> {
    let mut visited: HashSet<u32> = HashSet::new();

    let mut roots: Vec<u32> = deps.keys().copied().collect();
    roots.sort_unstable();

    for root in roots {
        if visited.contains(&root) {
            continue;
        }
        visited.insert(root);

        let mut on_path: HashSet<u32> = HashSet::new();
        on_path.insert(root);
        let mut stack = vec![Frame {
            node: root,
            neighbors: sorted_neighbors(deps, root),
            next: 0,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };

            if frame.next >= frame.neighbors.len() {
                on_path.remove(&frame.node);
                stack.pop();
                continue;
            }

            let next = frame.neighbors[frame.next];
            frame.next += 1;

            if on_path.contains(&next) {
                let start = stack
                    .iter()
                    .position(|f| f.node == next)
                    .unwrap_or_default();
                return stack[start..].iter().map(|f| f.node).collect();
            }

            if visited.insert(next) {
                on_path.insert(next);
                stack.push(Frame {
                    node: next,
                    neighbors: sorted_neighbors(deps, next),
                    next: 0,
                });
            }
        }
    }

    Vec::new()
}

fn sorted_neighbors(deps: &HashMap<u32, HashSet<u32>>, node: u32) -> Vec<u32> {
    let mut neighbors: Vec<u32> = deps
        .get(&node)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default();
    neighbors.sort_unstable();
    neighbors
}
