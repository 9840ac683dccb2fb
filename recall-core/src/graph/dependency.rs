//! Dependency Graph
//!
//! Adjacency map from a dependency name to the cached methods that must
//! recompute when it changes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;

/// Names of dependents, in registration order and without duplicates.
pub type Dependents = IndexSet<Arc<str>>;

/// A directed graph of `source -> dependent` edges keyed by member name.
///
/// Built once per class at declaration time and shared read-only by every
/// instance afterwards.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: HashMap<Arc<str>, Dependents>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` must recompute when `source` changes.
    ///
    /// Registering the same edge twice has no effect.
    pub fn register_dependency(&mut self, source: Arc<str>, dependent: Arc<str>) {
        self.edges.entry(source).or_default().insert(dependent);
    }

    /// Direct dependents of `source`.
    pub fn dependents_of(&self, source: &str) -> Option<&Dependents> {
        self.edges.get(source)
    }

    /// Whether `source` has an edge to `dependent`.
    pub fn has_edge(&self, source: &str, dependent: &str) -> bool {
        self.edges
            .get(source)
            .map(|deps| deps.contains(dependent))
            .unwrap_or(false)
    }

    /// Every name that appears as a source.
    pub fn sources(&self) -> impl Iterator<Item = &Arc<str>> {
        self.edges.keys()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }

    /// Find one cycle, returned as the path that closes it
    /// (`a -> b -> a` is `[a, b, a]`).
    ///
    /// Iterative three-colour DFS; sources are visited in sorted order so the
    /// reported cycle is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<Arc<str>>> {
        let mut roots: Vec<&Arc<str>> = self.edges.keys().collect();
        roots.sort();

        let mut done: HashSet<&Arc<str>> = HashSet::new();

        for root in roots {
            if done.contains(&root) {
                continue;
            }

            // (node, index of the next dependent to visit)
            let mut stack: Vec<(&Arc<str>, usize)> = vec![(root, 0)];
            let mut on_path: HashSet<&Arc<str>> = HashSet::new();
            on_path.insert(root);

            while let Some(&(node, next)) = stack.last() {
                let child = self.edges.get(node).and_then(|deps| deps.get_index(next));
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                match child {
                    Some(child) if on_path.contains(&child) => {
                        let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                        let mut path: Vec<Arc<str>> =
                            stack[start..].iter().map(|&(n, _)| Arc::clone(n)).collect();
                        path.push(Arc::clone(child));
                        return Some(path);
                    }
                    Some(child) if !done.contains(&child) => {
                        on_path.insert(child);
                        stack.push((child, 0));
                    }
                    Some(_) => {}
                    None => {
                        stack.pop();
                        on_path.remove(&node);
                        done.insert(node);
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn register_creates_entry() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency(name("first_name"), name("full_name"));
        graph.register_dependency(name("first_name"), name("slug"));

        let deps = graph.dependents_of("first_name").unwrap();
        assert_eq!(deps.len(), 2);
        assert!(graph.has_edge("first_name", "full_name"));
        assert!(graph.has_edge("first_name", "slug"));
        assert!(graph.dependents_of("last_name").is_none());

        let sources: Vec<&str> = graph.sources().map(|s| &**s).collect();
        assert_eq!(sources, vec!["first_name"]);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency(name("a"), name("m"));
        graph.register_dependency(name("a"), name("m"));

        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn acyclic_chain_has_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency(name("p"), name("a"));
        graph.register_dependency(name("a"), name("b"));
        graph.register_dependency(name("p"), name("b"));

        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn finds_self_loop() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency(name("m"), name("m"));

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec![name("m"), name("m")]);
    }

    #[test]
    fn finds_mutual_cycle() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency(name("p"), name("a"));
        graph.register_dependency(name("a"), name("b"));
        graph.register_dependency(name("b"), name("a"));

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&name("a")));
        assert!(cycle.contains(&name("b")));
        assert!(!cycle.contains(&name("p")));
    }
}
