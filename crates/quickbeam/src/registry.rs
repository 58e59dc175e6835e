//! Handle-indexed table of live containers

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::object::Object;

/// Opaque identifier of a live container.
///
/// Unique among live objects; a handle may be reissued once its object is
/// destroyed. `Handle::NULL` is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(pub u32);

impl Handle {
    /// The "no object" handle
    pub const NULL: Handle = Handle(0);

    /// Raw integer as seen by the host
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Check for the "no object" handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registry is the only strong owner of containers.
///
/// Lookups hand out cloned `Arc`s; no shard lock is ever held while an
/// object's own lock is taken.
pub(crate) struct Registry {
    objects: DashMap<Handle, Arc<Object>>,
    next: AtomicU32,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            objects: DashMap::new(),
            next: AtomicU32::new(1),
        }
    }

    /// Allocate a fresh handle and register the object built for it.
    pub(crate) fn insert_new(&self, make: impl FnOnce(Handle) -> Arc<Object>) -> Arc<Object> {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.objects.entry(Handle(raw)) {
                let obj = make(Handle(raw));
                slot.insert(Arc::clone(&obj));
                return obj;
            }
        }
    }

    /// Register an object under a specific handle, used when restoring a
    /// saved state. Returns `None` if the handle is taken.
    pub(crate) fn insert_at(
        &self,
        handle: Handle,
        make: impl FnOnce(Handle) -> Arc<Object>,
    ) -> Option<Arc<Object>> {
        if handle.is_null() {
            return None;
        }
        match self.objects.entry(handle) {
            Entry::Vacant(slot) => {
                let obj = make(handle);
                slot.insert(Arc::clone(&obj));
                self.next.fetch_max(handle.0.saturating_add(1), Ordering::Relaxed);
                Some(obj)
            }
            Entry::Occupied(_) => None,
        }
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<Arc<Object>> {
        self.objects
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|obj| obj.is_alive())
    }

    /// Unregister `obj`. Only removes the entry if it still belongs to `obj`.
    pub(crate) fn remove(&self, obj: &Object) -> Option<Arc<Object>> {
        self.objects
            .remove_if(&obj.handle(), |_, held| std::ptr::eq(held.as_ref(), obj))
            .map(|(_, held)| held)
    }

    /// Every registered object, ordered by handle.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Object>> {
        let mut all: Vec<Arc<Object>> = self
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by_key(|obj| obj.handle());
        all
    }

    /// Unregister everything and hand the objects back to the caller.
    pub(crate) fn drain(&self) -> Vec<Arc<Object>> {
        let handles: Vec<Handle> = self.objects.iter().map(|entry| *entry.key()).collect();
        handles
            .into_iter()
            .filter_map(|handle| self.objects.remove(&handle).map(|(_, obj)| obj))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }
}
