//! Ordered, name-keyed handler bindings.
//!
//! [`add_callback`] and [`delete_callback`] are pure over a `Vec`, so the
//! invocation order of surviving entries is always their registration order.
//! Registries are small and only touched at setup/teardown, so lookups are
//! linear.

use crate::error::CallbackError;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NamedCallback<H> {
    name: String,
    callback: H,
}

impl<H> NamedCallback<H> {
    pub fn new(name: impl Into<String>, callback: H) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &H {
        &self.callback
    }

    /// Replace the handler, returning the previous one.
    pub fn set_callback(&mut self, callback: H) -> H {
        std::mem::replace(&mut self.callback, callback)
    }
}

/// Register `callback` under `name`.
///
/// Returns the updated list, the handler previously bound to `name` (if any)
/// and whether the list now holds `callback`. With `rewrite == false` an
/// existing binding is left alone and reported with `added == false`.
pub fn add_callback<H: Clone>(
    mut callbacks: Vec<NamedCallback<H>>,
    name: &str,
    callback: H,
    rewrite: bool,
) -> (Vec<NamedCallback<H>>, Option<H>, bool) {
    match callbacks.iter().position(|cb| cb.name == name) {
        Some(index) if !rewrite => {
            let current = callbacks[index].callback.clone();
            (callbacks, Some(current), false)
        }
        Some(index) => {
            let previous = callbacks[index].set_callback(callback);
            (callbacks, Some(previous), true)
        }
        None => {
            callbacks.push(NamedCallback::new(name, callback));
            (callbacks, None, true)
        }
    }
}

/// Remove the binding for `name`, returning the removed handler.
pub fn delete_callback<H>(
    mut callbacks: Vec<NamedCallback<H>>,
    name: &str,
) -> (Vec<NamedCallback<H>>, Option<H>) {
    match callbacks.iter().position(|cb| cb.name == name) {
        Some(index) => {
            let removed = callbacks.remove(index);
            (callbacks, Some(removed.callback))
        }
        None => (callbacks, None),
    }
}

/// Owned registry for components that expose extensibility points.
#[derive(Debug, Clone)]
pub struct NamedCallbacks<H> {
    entries: Vec<NamedCallback<H>>,
}

impl<H> Default for NamedCallbacks<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Clone> NamedCallbacks<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, callback: H, rewrite: bool) -> (Option<H>, bool) {
        let (entries, previous, added) =
            add_callback(std::mem::take(&mut self.entries), name, callback, rewrite);
        self.entries = entries;
        (previous, added)
    }

    pub fn delete(&mut self, name: &str) -> Option<H> {
        let (entries, removed) = delete_callback(std::mem::take(&mut self.entries), name);
        self.entries = entries;
        removed
    }

    pub fn get(&self, name: &str) -> Option<&H> {
        self.entries
            .iter()
            .find(|cb| cb.name == name)
            .map(NamedCallback::callback)
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &NamedCallback<H>> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(NamedCallback::name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Type-erased handler for registries whose entries have different shapes.
///
/// Callers must state the type they expect; a mismatch is reported rather
/// than silently ignored.
#[derive(Clone)]
pub struct AnyCallback(Arc<dyn Any + Send + Sync>);

impl AnyCallback {
    pub fn new<T: Any + Send + Sync>(callback: T) -> Self {
        Self(Arc::new(callback))
    }

    pub fn downcast<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, CallbackError> {
        self.0
            .clone()
            .downcast::<T>()
            .map_err(|_| CallbackError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }
}

impl fmt::Debug for AnyCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCallback").finish_non_exhaustive()
    }
}
