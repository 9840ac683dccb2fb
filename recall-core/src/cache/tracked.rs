//! Tracked Properties
//!
//! A tracked property is a per-instance value whose writes drive
//! invalidation.
//!
//! # How Tracked Properties Work
//!
//! 1. The property is declared once per class; the returned handle is shared
//!    by every instance and holds no value itself.
//!
//! 2. Reading goes to the instance's own slot, so two instances never see
//!    each other's values.
//!
//! 3. Writing a value that differs from the stored one marks every cached
//!    method that depends on the property, directly or transitively, dirty
//!    on that instance. Writing an equal value only replaces it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::class::ClassId;
use super::state::Cacheable;
use crate::graph::Marked;

/// Handle to a declared tracked property of type `T` on hosts of type `H`.
///
/// # Example
///
/// ```rust,ignore
/// let first_name = class.tracked::<String>("first_name")?;
///
/// first_name.set(&person, "Ada".to_string());
/// assert_eq!(first_name.get(&person).as_deref(), Some("Ada"));
/// ```
pub struct Tracked<H, T> {
    class: ClassId,
    name: Arc<str>,
    _marker: PhantomData<fn(&H) -> T>,
}

impl<H, T> Tracked<H, T>
where
    H: Cacheable,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(class: ClassId, name: Arc<str>) -> Self {
        Self {
            class,
            name,
            _marker: PhantomData,
        }
    }

    /// The declared property name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Current value on `host`, or `None` if it was never written.
    pub fn get(&self, host: &H) -> Option<T> {
        self.check_class(host);
        host.cache_state().read_property(&self.name)
    }

    /// Write a new value on `host`.
    ///
    /// If the value differs from the stored one, every dependent cached
    /// method is marked dirty on `host` before this returns. The names that
    /// were marked are returned.
    pub fn set(&self, host: &H, value: T) -> Marked {
        self.check_class(host);
        host.cache_state().write_property(&self.name, value)
    }

    /// Write a value derived from the current one.
    pub fn update<F>(&self, host: &H, f: F) -> Marked
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let current = self.get(host);
        self.set(host, f(current.as_ref()))
    }

    fn check_class(&self, host: &H) {
        debug_assert_eq!(
            host.cache_state().class().id(),
            self.class,
            "tracked property `{}` used with an instance of another class",
            self.name
        );
    }
}

impl<H, T> Clone for Tracked<H, T> {
    fn clone(&self) -> Self {
        Self {
            class: self.class,
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<H, T> fmt::Debug for Tracked<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("class", &self.class)
            .field("name", &self.name)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
