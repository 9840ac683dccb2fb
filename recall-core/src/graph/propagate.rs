//! Invalidation Propagator
//!
//! When a tracked property (or a cached method) changes on an instance, every
//! cached method that transitively depends on it must be marked dirty on that
//! same instance.
//!
//! # Algorithm
//!
//! Breadth-first walk over the dependency graph:
//!
//! 1. Seed the queue with the direct dependents of the changed name
//! 2. Pop a name; skip it if already visited
//! 3. Mark it visited, mark it dirty, enqueue its own dependents
//! 4. Stop when the queue is empty
//!
//! Dependency names are user supplied strings, so nothing stops a declaration
//! like `a` depends on `b` depends on `a`. The visited set bounds the walk to
//! one visit per name, which is what makes cyclic declarations terminate.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use smallvec::SmallVec;

use super::dependency::DependencyGraph;

/// Something that records dirty marks for one instance.
pub trait DirtyMarker {
    /// Mark `name` as needing recomputation.
    fn mark_dirty(&mut self, name: &Arc<str>);
}

/// Names marked by one propagation, in visit order.
pub type Marked = SmallVec<[Arc<str>; 8]>;

impl DependencyGraph {
    /// Mark every cached method reachable from `start` as dirty.
    ///
    /// `start` itself is not marked unless it is reachable from itself through
    /// a cycle. Returns the marked names in the order they were visited.
    pub fn propagate<M>(&self, start: &str, marker: &mut M) -> Marked
    where
        M: DirtyMarker + ?Sized,
    {
        let mut marked = Marked::new();
        let mut visited: HashSet<&Arc<str>> = HashSet::new();
        let mut queue: VecDeque<&Arc<str>> = VecDeque::new();

        if let Some(dependents) = self.dependents_of(start) {
            queue.extend(dependents.iter());
        }

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }

            marker.mark_dirty(name);
            marked.push(Arc::clone(name));

            if let Some(dependents) = self.dependents_of(name) {
                queue.extend(dependents.iter().filter(|d| !visited.contains(d)));
            }
        }

        marked
    }
}
