//! Memoization Primitives
//!
//! This module implements the per-class declarations and the per-instance
//! machinery: tracked properties, cached methods and the state they share.
//!
//! # Concepts
//!
//! ## Tracked properties
//!
//! A tracked property holds a value per instance. Writing a different value
//! marks every cached method that depends on it dirty on that instance.
//!
//! ## Cached methods
//!
//! A cached method is an async computation whose result is stored per
//! instance and reused until one of its declared dependencies changes. A
//! cached method may itself be a dependency of another cached method.
//!
//! ## Instance state
//!
//! Each host instance embeds an [`InstanceState`]. Declarations are shared
//! across instances and hold no per-instance data; everything that varies
//! lives in the instance's state and is dropped with it.
//!
//! # Implementation Notes
//!
//! Dependencies are declared by name, not discovered. The class builder
//! records `dependency -> method` edges once; writes walk those edges.
//!
//! Computations run as spawned tokio tasks. While one runs, further calls
//! for the same instance and method join it instead of starting another.

mod cached;
mod class;
mod flight;
mod frame;
mod state;
mod tracked;

pub use cached::Cached;
pub use class::{ClassBuilder, ClassDescriptor, ClassId, ClassOptions, MemberKind};
pub use state::{Cacheable, InstanceId, InstanceState};
pub use tracked::Tracked;
