//! Dependency Graph
//!
//! This module implements the per-class graph that relates tracked properties
//! and cached methods.
//!
//! # Overview
//!
//! The graph is keyed by member name:
//!
//! - Nodes are tracked properties or cached methods
//! - An edge `source -> dependent` means "when `source` changes, `dependent`
//!   must recompute"
//!
//! A cached method can itself be the source of an edge, so invalidation
//! chains. Propagation walks the graph and marks every reachable cached
//! method dirty on one instance.
//!
//! # Design Decisions
//!
//! 1. The graph is built once per class and never mutated afterwards, so
//!    every instance shares it without locking.
//!
//! 2. Dependents are kept in an `IndexSet`: duplicate declarations collapse
//!    and iteration order follows declaration order.
//!
//! 3. Cycles are representable. The propagator tolerates them and the class
//!    builder can optionally reject them.

mod dependency;
mod propagate;

pub use dependency::{DependencyGraph, Dependents};
pub use propagate::{DirtyMarker, Marked};
