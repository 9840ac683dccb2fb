//! Class Declarations
//!
//! A class is declared once, before any instance exists. Declaring a tracked
//! property or a cached method returns a handle that is shared by every
//! instance; declaring a cached method also records its dependency edges.
//! `build()` freezes the result into a [`ClassDescriptor`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut class = ClassBuilder::<Person>::new("Person");
//! let first_name = class.tracked::<String>("first_name")?;
//! let last_name = class.tracked::<String>("last_name")?;
//! let full_name = class.cached("full_name", ["first_name", "last_name"], |p: Arc<Person>| async move {
//!     Ok::<_, Infallible>(format!("{}{}", ..., ...))
//! })?;
//! let descriptor = class.build()?;
//! ```

use std::error::Error as StdError;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::cached::{Cached, ComputeFn};
use super::flight::ErasedValue;
use super::state::Cacheable;
use super::tracked::Tracked;
use crate::error::{CacheError, CacheResult, SharedError};
use crate::graph::{DependencyGraph, Dependents};

/// Unique identifier for a declared class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u64);

impl ClassId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What a declared member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A property whose writes drive invalidation.
    Tracked,

    /// A memoized computation.
    Cached,
}

/// Declaration-time options for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassOptions {
    /// Reject dependencies that name an undeclared member.
    pub strict_dependencies: bool,

    /// Accept cyclic dependency declarations. When false, `build()` fails on
    /// the first cycle it finds.
    pub allow_cycles: bool,
}

impl Default for ClassOptions {
    fn default() -> Self {
        Self {
            strict_dependencies: true,
            allow_cycles: true,
        }
    }
}

impl ClassOptions {
    /// Parse options from a JSON object. Missing fields take their defaults.
    pub fn from_json(json: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The frozen, shared description of a class: its members and dependency
/// graph. Instances hold an `Arc` to it.
#[derive(Debug)]
pub struct ClassDescriptor {
    id: ClassId,
    name: Arc<str>,
    options: ClassOptions,
    members: IndexMap<Arc<str>, MemberKind>,
    graph: DependencyGraph,
}

impl ClassDescriptor {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn options(&self) -> ClassOptions {
        self.options
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Kind of the member called `name`, if declared.
    pub fn member_kind(&self, name: &str) -> Option<MemberKind> {
        self.members.get(name).copied()
    }

    /// Declared members in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&Arc<str>, MemberKind)> {
        self.members.iter().map(|(name, kind)| (name, *kind))
    }

    /// Cached methods that depend directly on `name`.
    pub fn dependents_of(&self, name: &str) -> Option<&Dependents> {
        self.graph.dependents_of(name)
    }

    pub(crate) fn member_key(&self, name: &str) -> Option<&Arc<str>> {
        self.members.get_key_value(name).map(|(key, _)| key)
    }
}

/// Declares the tracked properties and cached methods of host type `H`.
pub struct ClassBuilder<H> {
    id: ClassId,
    name: Arc<str>,
    options: ClassOptions,
    members: IndexMap<Arc<str>, MemberKind>,
    declared: Vec<(Arc<str>, SmallVec<[Arc<str>; 4]>)>,
    graph: DependencyGraph,
    _host: PhantomData<fn() -> H>,
}

impl<H: Cacheable> ClassBuilder<H> {
    /// Start declaring a class with default options.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_options(name, ClassOptions::default())
    }

    pub fn with_options(name: impl Into<Arc<str>>, options: ClassOptions) -> Self {
        Self {
            id: ClassId::new(),
            name: name.into(),
            options,
            members: IndexMap::new(),
            declared: Vec::new(),
            graph: DependencyGraph::new(),
            _host: PhantomData,
        }
    }

    /// Declare a tracked property holding values of type `T`.
    pub fn tracked<T>(&mut self, name: impl Into<Arc<str>>) -> CacheResult<Tracked<H, T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let name = name.into();
        if self.members.contains_key(&name) {
            return Err(CacheError::DuplicateMember {
                class: Arc::clone(&self.name),
                member: name,
            });
        }

        self.members.insert(Arc::clone(&name), MemberKind::Tracked);
        Ok(Tracked::new(self.id, name))
    }

    /// Declare a cached method.
    ///
    /// `dependencies` names the tracked properties and cached methods whose
    /// change invalidates this one. `compute` receives the instance and
    /// produces the value; it may suspend and it may fail.
    pub fn cached<V, E, F, Fut, I, S>(
        &mut self,
        name: impl Into<Arc<str>>,
        dependencies: I,
        compute: F,
    ) -> CacheResult<Cached<H, V>>
    where
        V: Clone + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
        F: Fn(Arc<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let name = name.into();
        match self.members.get(&name) {
            Some(MemberKind::Tracked) => {
                return Err(CacheError::NotInvocable {
                    class: Arc::clone(&self.name),
                    member: name,
                });
            }
            Some(MemberKind::Cached) => {
                return Err(CacheError::DuplicateMember {
                    class: Arc::clone(&self.name),
                    member: name,
                });
            }
            None => {}
        }

        let dependencies: SmallVec<[Arc<str>; 4]> =
            dependencies.into_iter().map(Into::into).collect();
        for dependency in &dependencies {
            self.graph
                .register_dependency(Arc::clone(dependency), Arc::clone(&name));
        }

        self.members.insert(Arc::clone(&name), MemberKind::Cached);
        self.declared.push((Arc::clone(&name), dependencies));

        let compute: Arc<ComputeFn<H>> = Arc::new(move |host: Arc<H>| {
            let fut = compute(host);
            async move {
                match fut.await {
                    Ok(value) => Ok(Arc::new(value) as ErasedValue),
                    Err(err) => Err(Arc::new(err) as SharedError),
                }
            }
            .boxed()
        });

        Ok(Cached::new(self.id, name, compute))
    }

    /// Validate the declarations and freeze them into a shared descriptor.
    pub fn build(self) -> CacheResult<Arc<ClassDescriptor>> {
        if self.options.strict_dependencies {
            for (method, dependencies) in &self.declared {
                if let Some(unknown) = dependencies
                    .iter()
                    .find(|dep| !self.members.contains_key(*dep))
                {
                    return Err(CacheError::UnknownDependency {
                        class: Arc::clone(&self.name),
                        method: Arc::clone(method),
                        dependency: Arc::clone(unknown),
                    });
                }
            }
        }

        if let Some(path) = self.graph.find_cycle() {
            if !self.options.allow_cycles {
                return Err(CacheError::DependencyCycle {
                    class: Arc::clone(&self.name),
                    path,
                });
            }
            let path: Vec<&str> = path.iter().map(|name| &**name).collect();
            warn!(class = %self.name, cycle = ?path, "cyclic dependency declaration");
        }

        debug!(
            class = %self.name,
            members = self.members.len(),
            edges = self.graph.edge_count(),
            "class built"
        );

        Ok(Arc::new(ClassDescriptor {
            id: self.id,
            name: self.name,
            options: self.options,
            members: self.members,
            graph: self.graph,
        }))
    }
}
