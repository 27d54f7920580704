//! Unsatisfied-dependency graph.
//!
//! Tracks only edges whose target has not yet completed:
//! - `edges`: item -> items it still waits for
//! - `reverse`: item -> items still waiting for it
//!
//! Invariant: `edges` and `reverse` are kept in sync. An item with no entry
//! in `edges` is unblocked.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Dependency graph over queue item ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: item -> items it waits for.
    edges: HashMap<Uuid, HashSet<Uuid>>,

    /// Reverse edges: item -> items waiting for it.
    reverse: HashMap<Uuid, HashSet<Uuid>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge: `item` waits for `depends_on`.
    pub fn add_dependency(&mut self, item: Uuid, depends_on: Uuid) {
        self.edges.entry(item).or_default().insert(depends_on);
        self.reverse.entry(depends_on).or_default().insert(item);
    }

    /// Check if `item` still has unsatisfied dependencies.
    pub fn is_blocked(&self, item: Uuid) -> bool {
        self.edges.get(&item).is_some_and(|deps| !deps.is_empty())
    }

    /// Ids `item` is still waiting for.
    pub fn blocking(&self, item: Uuid) -> Vec<Uuid> {
        self.edges
            .get(&item)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mark `completed` as satisfied and drop every edge into it.
    ///
    /// Returns the waiters that became fully unblocked.
    pub fn satisfy(&mut self, completed: Uuid) -> Vec<Uuid> {
        let Some(waiters) = self.reverse.remove(&completed) else {
            return Vec::new();
        };

        let mut unblocked = Vec::new();
        for waiter in waiters {
            if let Some(deps) = self.edges.get_mut(&waiter) {
                deps.remove(&completed);
                if deps.is_empty() {
                    self.edges.remove(&waiter);
                    unblocked.push(waiter);
                }
            }
        }
        unblocked
    }

    /// Drop `item`'s own outgoing edges (e.g. on cancellation).
    ///
    /// Edges pointing at `item` are kept: anything waiting for it stays
    /// blocked, since only completion satisfies a dependency.
    pub fn remove_item(&mut self, item: Uuid) {
        let Some(deps) = self.edges.remove(&item) else {
            return;
        };
        for dep in deps {
            if let Some(waiters) = self.reverse.get_mut(&dep) {
                waiters.remove(&item);
                if waiters.is_empty() {
                    self.reverse.remove(&dep);
                }
            }
        }
    }

    /// Remove all edges.
    pub fn clear(&mut self) {
        self.edges.clear();
        self.reverse.clear();
    }

    /// Check whether attaching `dependencies` to `item` would create a cycle.
    ///
    /// Returns the cycle path when one exists. Runs a DFS from each declared
    /// dependency looking for a path back to `item` through existing edges.
    pub fn would_create_cycle(
        &self,
        item: Uuid,
        dependencies: &HashSet<Uuid>,
    ) -> Option<Vec<Uuid>> {
        if dependencies.contains(&item) {
            return Some(vec![item]);
        }

        for &start in dependencies {
            let mut stack = vec![start];
            let mut visited = HashSet::new();
            let mut prev: HashMap<Uuid, Uuid> = HashMap::new();
            visited.insert(start);

            while let Some(node) = stack.pop() {
                if node == item {
                    // Reconstruct item -> start -> ... -> item.
                    let mut path = vec![item];
                    let mut current = item;
                    while let Some(&p) = prev.get(&current) {
                        path.push(p);
                        current = p;
                    }
                    path.push(item);
                    path.reverse();
                    return Some(path);
                }
                for &next in self.edges.get(&node).into_iter().flatten() {
                    if visited.insert(next) {
                        prev.insert(next, node);
                        stack.push(next);
                    }
                }
            }
        }
        None
    }
}
