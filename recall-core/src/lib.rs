//! Recall Core
//!
//! This crate provides dependency-aware memoization for objects with
//! expensive derived values. It implements:
//!
//! - Tracked properties whose writes drive invalidation
//! - Cached async methods, memoized per instance
//! - Transitive invalidation through a declared dependency graph
//! - Single-flight execution of concurrent calls
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the per-class dependency graph and the invalidation walk
//! - `cache`: class declarations, instance state, tracked and cached members
//!
//! # Example
//!
//! ```rust,ignore
//! use recall_core::{Cacheable, ClassBuilder, InstanceState};
//!
//! struct Person {
//!     state: InstanceState,
//! }
//!
//! impl Cacheable for Person {
//!     fn cache_state(&self) -> &InstanceState {
//!         &self.state
//!     }
//! }
//!
//! let mut class = ClassBuilder::<Person>::new("Person");
//! let first_name = class.tracked::<String>("first_name")?;
//! let name = first_name.clone();
//! let full_name = class.cached("full_name", ["first_name"], move |p: Arc<Person>| {
//!     let name = name.clone();
//!     async move { Ok::<_, Infallible>(name.get(&p).unwrap_or_default()) }
//! })?;
//! let class = class.build()?;
//!
//! let person = Arc::new(Person { state: InstanceState::new(&class) });
//! first_name.set(&person, "Ada".to_string());
//! assert_eq!(full_name.get(&person).await?, "Ada");
//! ```

pub mod cache;
pub mod error;
pub mod graph;

pub use cache::{
    Cacheable, Cached, ClassBuilder, ClassDescriptor, ClassId, ClassOptions, InstanceId,
    InstanceState, MemberKind, Tracked,
};
pub use error::{CacheError, CacheResult, SharedError};
pub use graph::{DependencyGraph, Marked};
