//! Instance State
//!
//! Everything that varies per instance lives here: tracked property values,
//! cached values, the dirty set and in-flight computations. Host types embed
//! one `InstanceState` and expose it through [`Cacheable`], so the state is
//! dropped together with its instance and is never visible to another one.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::class::{ClassDescriptor, MemberKind};
use super::flight::{ErasedValue, Flight};
use crate::graph::{DirtyMarker, Marked};

/// Unique identifier for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A host type whose instances carry cache state.
///
/// ```rust,ignore
/// struct Person {
///     state: InstanceState,
/// }
///
/// impl Cacheable for Person {
///     fn cache_state(&self) -> &InstanceState {
///         &self.state
///     }
/// }
/// ```
pub trait Cacheable: Send + Sync + 'static {
    fn cache_state(&self) -> &InstanceState;
}

/// Per-instance storage for one host object.
pub struct InstanceState {
    id: InstanceId,
    class: Arc<ClassDescriptor>,
    slots: Mutex<Slots>,
}

impl InstanceState {
    /// Create empty state for a new instance of `class`.
    ///
    /// Nothing is allocated until the first tracked write or cached call.
    pub fn new(class: &Arc<ClassDescriptor>) -> Self {
        Self {
            id: InstanceId::new(),
            class: Arc::clone(class),
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Whether `name` is currently marked dirty.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.slots.lock().dirty.contains(name)
    }

    /// Whether `name` has ever been computed successfully.
    pub fn has_value(&self, name: &str) -> bool {
        self.slots.lock().cache.contains_key(name)
    }

    /// Whether the stored value of `name` can be returned without recomputing.
    pub fn is_valid(&self, name: &str) -> bool {
        self.slots.lock().valid_value(name).is_some()
    }

    /// Whether a computation of `name` is currently running.
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.slots.lock().in_flight.contains_key(name)
    }

    /// All names currently marked dirty, sorted.
    pub fn dirty_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.slots.lock().dirty.iter().cloned().collect();
        names.sort();
        names
    }

    /// Mark `name` dirty (if it is a cached method) and everything that
    /// depends on it.
    ///
    /// Returns the names that were marked. Unknown names mark nothing.
    pub fn invalidate(&self, name: &str) -> Marked {
        let Some(key) = self.class.member_key(name) else {
            return Marked::new();
        };

        let mut slots = self.slots.lock();
        let mut marked = Marked::new();
        if self.class.member_kind(name) == Some(MemberKind::Cached) {
            slots.mark_dirty(key);
            marked.push(Arc::clone(key));
        }
        for dependent in self.class.graph().propagate(name, &mut *slots) {
            if !marked.contains(&dependent) {
                marked.push(dependent);
            }
        }

        debug!(
            class = %self.class.name(),
            instance = self.id.0,
            member = name,
            marked = marked.len(),
            "invalidated"
        );
        marked
    }

    /// Current value of a tracked property.
    pub(crate) fn read_property<T>(&self, name: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.slots
            .lock()
            .properties
            .get(name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Store a tracked property value and propagate if it changed.
    ///
    /// The value is always stored; propagation only happens when it differs
    /// from the previous one (an unset property differs from everything).
    pub(crate) fn write_property<T>(&self, name: &Arc<str>, value: T) -> Marked
    where
        T: PartialEq + Send + Sync + 'static,
    {
        let mut slots = self.slots.lock();
        let changed = match slots
            .properties
            .get(name)
            .and_then(|current| current.downcast_ref::<T>())
        {
            Some(current) => *current != value,
            None => true,
        };
        slots.properties.insert(Arc::clone(name), Box::new(value));

        if !changed {
            return Marked::new();
        }

        let marked = self.class.graph().propagate(name, &mut *slots);
        debug!(
            class = %self.class.name(),
            instance = self.id.0,
            property = %name,
            marked = marked.len(),
            "tracked property changed"
        );
        marked
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock()
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("InstanceState")
            .field("id", &self.id)
            .field("class", self.class.name())
            .field("dirty", &slots.dirty)
            .field("cached", &slots.cache.len())
            .field("properties", &slots.properties.len())
            .field("in_flight", &slots.in_flight.len())
            .finish()
    }
}

/// The mutable part of an instance's state.
#[derive(Default)]
pub(crate) struct Slots {
    dirty: HashSet<Arc<str>>,
    cache: HashMap<Arc<str>, ErasedValue>,
    properties: HashMap<Arc<str>, Box<dyn Any + Send + Sync>>,
    in_flight: HashMap<Arc<str>, Flight>,
    generations: HashMap<Arc<str>, u64>,
}

impl Slots {
    /// The stored value of `name`, if present and not dirty.
    pub(crate) fn valid_value(&self, name: &str) -> Option<ErasedValue> {
        if self.dirty.contains(name) {
            return None;
        }
        self.cache.get(name).cloned()
    }

    /// Number of dirty marks `name` has received so far.
    pub(crate) fn generation(&self, name: &str) -> u64 {
        self.generations.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn flight(&self, name: &str) -> Option<Flight> {
        self.in_flight.get(name).cloned()
    }

    pub(crate) fn begin(&mut self, name: Arc<str>, flight: Flight) {
        self.in_flight.insert(name, flight);
    }

    /// Store a freshly computed value and close its flight.
    ///
    /// The dirty mark is cleared only if no dirty mark arrived since
    /// `started_at`. Returns whether the value is already stale.
    pub(crate) fn commit(&mut self, name: &Arc<str>, value: ErasedValue, started_at: u64) -> bool {
        self.cache.insert(Arc::clone(name), value);
        self.in_flight.remove(name);

        let stale = self.generation(name) != started_at;
        if !stale {
            self.dirty.remove(name);
        }
        stale
    }

    /// Close a flight without touching the cache or the dirty set.
    pub(crate) fn release(&mut self, name: &str) {
        self.in_flight.remove(name);
    }
}

impl DirtyMarker for Slots {
    fn mark_dirty(&mut self, name: &Arc<str>) {
        self.dirty.insert(Arc::clone(name));
        *self.generations.entry(Arc::clone(name)).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::class::ClassBuilder;
    use futures_util::FutureExt;
    use std::convert::Infallible;

    struct Host {
        state: InstanceState,
    }

    impl Cacheable for Host {
        fn cache_state(&self) -> &InstanceState {
            &self.state
        }
    }

    async fn constant(_: Arc<Host>) -> Result<u32, Infallible> {
        Ok(1)
    }

    fn class() -> Arc<ClassDescriptor> {
        let mut class = ClassBuilder::<Host>::new("Host");
        class.tracked::<u32>("p").unwrap();
        class.cached("a", ["p"], constant).unwrap();
        class.cached("b", ["a"], constant).unwrap();
        class.build().unwrap()
    }

    fn erased(value: u32) -> ErasedValue {
        Arc::new(value)
    }

    fn names(list: &[&str]) -> Vec<Arc<str>> {
        list.iter().map(|name| Arc::from(*name)).collect()
    }

    fn pending() -> Flight {
        futures_util::future::pending().boxed().shared()
    }

    #[test]
    fn instance_ids_are_unique() {
        let class = class();
        let a = InstanceState::new(&class);
        let b = InstanceState::new(&class);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn starts_empty() {
        let state = InstanceState::new(&class());
        assert!(!state.has_value("a"));
        assert!(!state.is_dirty("a"));
        assert!(!state.is_valid("a"));
        assert!(state.dirty_names().is_empty());
        assert_eq!(state.read_property::<u32>("p"), None);
    }

    #[test]
    fn first_write_propagates() {
        let state = InstanceState::new(&class());
        let p: Arc<str> = Arc::from("p");

        let marked = state.write_property(&p, 1u32);

        assert_eq!(marked.len(), 2);
        assert_eq!(state.read_property::<u32>("p"), Some(1));
        assert_eq!(state.dirty_names(), names(&["a", "b"]));
    }

    #[test]
    fn equal_write_does_not_propagate() {
        let state = InstanceState::new(&class());
        let p: Arc<str> = Arc::from("p");
        state.write_property(&p, 1u32);
        state.lock().dirty.clear();

        let marked = state.write_property(&p, 1u32);

        assert!(marked.is_empty());
        assert!(state.dirty_names().is_empty());
    }

    #[test]
    fn commit_clears_dirty_when_no_write_arrived() {
        let state = InstanceState::new(&class());
        let a: Arc<str> = Arc::from("a");
        state.invalidate("a");

        let mut slots = state.lock();
        let started_at = slots.generation("a");
        slots.begin(Arc::clone(&a), pending());
        let stale = slots.commit(&a, erased(7), started_at);
        drop(slots);

        assert!(!stale);
        assert!(state.is_valid("a"));
        assert!(!state.is_in_flight("a"));
    }

    #[test]
    fn commit_keeps_dirty_when_write_arrived() {
        let state = InstanceState::new(&class());
        let a: Arc<str> = Arc::from("a");
        let p: Arc<str> = Arc::from("p");

        let started_at = state.lock().generation("a");
        state.lock().begin(Arc::clone(&a), pending());
        state.write_property(&p, 5u32);
        let stale = state.lock().commit(&a, erased(7), started_at);

        assert!(stale);
        assert!(state.has_value("a"));
        assert!(state.is_dirty("a"));
        assert!(!state.is_valid("a"));
    }

    #[test]
    fn release_leaves_cache_alone() {
        let state = InstanceState::new(&class());
        let a: Arc<str> = Arc::from("a");
        state.lock().begin(Arc::clone(&a), pending());

        state.lock().release("a");

        assert!(!state.is_in_flight("a"));
        assert!(!state.has_value("a"));
    }

    #[test]
    fn invalidate_marks_self_and_dependents() {
        let state = InstanceState::new(&class());

        let marked = state.invalidate("a");

        assert_eq!(marked.to_vec(), names(&["a", "b"]));
        assert!(state.invalidate("nope").is_empty());
    }

    #[test]
    fn invalidating_a_property_marks_only_dependents() {
        let state = InstanceState::new(&class());

        let marked = state.invalidate("p");

        assert_eq!(marked.len(), 2);
        assert!(!state.is_dirty("p"));
    }
}
