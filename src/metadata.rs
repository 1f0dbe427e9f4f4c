//! Typed per-request metadata.
//!
//! Middleware often needs to hand something to the endpoint it wraps: the
//! authenticated user, a request id, a tenant. [`Metadata`] is a small
//! concurrent map for that, keyed by [`Key<T>`] so a value always comes back
//! as the type it was stored with.
//!
//! ```rust
//! use jsonrest::Key;
//!
//! #[derive(Debug)]
//! struct User { id: u64 }
//!
//! const CURRENT_USER: Key<User> = Key::new("current_user");
//!
//! // in a middleware:    req.set(&CURRENT_USER, User { id: 7 });
//! // in the endpoint:    let user = req.get(&CURRENT_USER);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

/// Identifies a metadata slot holding a `T`.
///
/// Two keys address the same slot when they share both name and type.
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _marker: PhantomData }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}

type Slot = (TypeId, &'static str);
type Value = Arc<dyn Any + Send + Sync>;

/// Concurrent key/value store living exactly as long as one request.
#[derive(Default)]
pub struct Metadata {
    entries: RwLock<HashMap<Slot, Value>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing anything previously stored under `key`.
    pub fn set<T: Send + Sync + 'static>(&self, key: &Key<T>, value: T) {
        self.entries
            .write()
            .insert(slot(key), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<Arc<T>> {
        let value = self.entries.read().get(&slot(key)).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn contains<T: 'static>(&self, key: &Key<T>) -> bool {
        self.entries.read().contains_key(&slot(key))
    }

    pub fn remove<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<Arc<T>> {
        let value = self.entries.write().remove(&slot(key))?;
        value.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.entries.read().keys().map(|(_, name)| *name).collect();
        f.debug_struct("Metadata").field("keys", &names).finish()
    }
}

fn slot<T: 'static>(key: &Key<T>) -> Slot {
    (TypeId::of::<T>(), key.name)
}
