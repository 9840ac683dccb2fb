//! Cached Methods
//!
//! A cached method is a derived value that is computed on first access and
//! reused until one of its declared dependencies changes.
//!
//! # How Cached Methods Work
//!
//! 1. On first access, the computation runs and its result is stored on the
//!    instance.
//!
//! 2. When accessed again with nothing invalidated, the stored value is
//!    returned without running anything.
//!
//! 3. When a dependency changes, the method is marked dirty on that instance
//!    (and so is everything that depends on the method).
//!
//! 4. On next access, a dirty method recomputes.
//!
//! Calls that arrive while a computation is running join it instead of
//! starting another one. A failed computation stores nothing, so the next
//! call simply retries.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::trace;

use super::class::ClassId;
use super::flight::{self, ErasedValue};
use super::frame::CallStack;
use super::state::Cacheable;
use crate::error::{CacheError, CacheResult, SharedError};
use crate::graph::Marked;

/// Type-erased computation shared by every instance of a class.
pub(crate) type ComputeFn<H> =
    dyn Fn(Arc<H>) -> BoxFuture<'static, Result<ErasedValue, SharedError>> + Send + Sync;

/// Handle to a declared cached method returning `V` on hosts of type `H`.
///
/// The handle holds no per-instance data; cloning it is cheap and every clone
/// refers to the same declaration.
pub struct Cached<H, V> {
    class: ClassId,
    name: Arc<str>,
    compute: Arc<ComputeFn<H>>,
    _value: PhantomData<fn() -> V>,
}

impl<H, V> Cached<H, V>
where
    H: Cacheable,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(class: ClassId, name: Arc<str>, compute: Arc<ComputeFn<H>>) -> Self {
        Self {
            class,
            name,
            compute,
            _value: PhantomData,
        }
    }

    /// The declared method name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Get the value for `host`, computing it if it is missing or dirty.
    ///
    /// Concurrent calls on the same instance share one computation. A
    /// computation failure is returned to every caller that shared it and
    /// leaves the stored value untouched.
    ///
    /// A call that arrives while a computation is running joins it, even if a
    /// dependency was written after that computation started; the method stays
    /// dirty and the next call recomputes.
    pub async fn get(&self, host: &Arc<H>) -> CacheResult<V> {
        let state = host.cache_state();
        self.check_class(host);

        let stack = CallStack::current();
        if stack.contains(state.id(), &self.name) {
            return Err(CacheError::Reentrant {
                method: Arc::clone(&self.name),
            });
        }

        let (flight, takeoff) = {
            let mut slots = state.lock();

            if let Some(flight) = slots.flight(&self.name) {
                trace!(method = %self.name, instance = state.id().raw(), "join in-flight computation");
                (flight, None)
            } else if let Some(value) = slots.valid_value(&self.name) {
                trace!(method = %self.name, instance = state.id().raw(), "cache hit");
                return self.downcast(&value);
            } else {
                let (flight, takeoff) = flight::launch(
                    Arc::clone(host),
                    Arc::clone(&self.name),
                    slots.generation(&self.name),
                    Arc::clone(&self.compute),
                    stack.push(state.id(), Arc::clone(&self.name)),
                )?;
                slots.begin(Arc::clone(&self.name), flight.clone());
                (flight, Some(takeoff))
            }
        };

        if let Some(takeoff) = takeoff {
            takeoff.spawn();
        }

        let value = flight.await?;
        self.downcast(&value)
    }

    /// The stored value for `host`, only if it is valid. Never computes.
    pub fn peek(&self, host: &H) -> Option<V> {
        self.check_class(host);
        let value = host.cache_state().lock().valid_value(&self.name)?;
        self.downcast(&value).ok()
    }

    /// Mark this method dirty on `host`, along with everything that depends
    /// on it.
    pub fn invalidate(&self, host: &H) -> Marked {
        self.check_class(host);
        host.cache_state().invalidate(&self.name)
    }

    /// Whether the stored value for `host` can be returned without
    /// recomputing.
    pub fn is_valid(&self, host: &H) -> bool {
        host.cache_state().is_valid(&self.name)
    }

    fn downcast(&self, value: &ErasedValue) -> CacheResult<V> {
        value
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| CacheError::TypeMismatch {
                member: Arc::clone(&self.name),
            })
    }

    fn check_class(&self, host: &H) {
        debug_assert_eq!(
            host.cache_state().class().id(),
            self.class,
            "cached method `{}` used with an instance of another class",
            self.name
        );
    }
}

impl<H, V> Clone for Cached<H, V> {
    fn clone(&self) -> Self {
        Self {
            class: self.class,
            name: Arc::clone(&self.name),
            compute: Arc::clone(&self.compute),
            _value: PhantomData,
        }
    }
}

impl<H, V> fmt::Debug for Cached<H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("class", &self.class)
            .field("name", &self.name)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
