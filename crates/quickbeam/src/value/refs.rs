//! Container edges

use std::fmt;
use std::sync::{Arc, Weak};

use crate::object::Object;
use crate::registry::Handle;

/// An edge from a value to a container.
///
/// The edge never owns the container's memory (the registry does), so cycles
/// cost nothing to build and are reclaimed by the collector. What it does own
/// is one *internal claim*: creating or cloning an edge bumps the target's
/// internal count, dropping it gives the claim back.
pub struct ObjRef {
    handle: Handle,
    target: Weak<Object>,
}

impl ObjRef {
    /// Create an edge to `obj`, taking an internal claim on it.
    pub fn claim(obj: &Arc<Object>) -> Self {
        obj.retain_internal();
        Self {
            handle: obj.handle(),
            target: Arc::downgrade(obj),
        }
    }

    /// Like [`ObjRef::claim`], but `None` if `obj` is already dead.
    pub(crate) fn try_claim(obj: &Arc<Object>) -> Option<Self> {
        obj.retain_internal().then(|| Self {
            handle: obj.handle(),
            target: Arc::downgrade(obj),
        })
    }

    /// Handle of the target at the time the edge was made
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The target, if it has not been destroyed.
    pub fn upgrade(&self) -> Option<Arc<Object>> {
        self.target.upgrade().filter(|obj| obj.is_alive())
    }

    /// Check if both edges point at the same container
    pub fn same_target(&self, other: &ObjRef) -> bool {
        Weak::ptr_eq(&self.target, &other.target)
    }

    /// Check if this edge points at `obj`
    pub fn points_to(&self, obj: &Object) -> bool {
        std::ptr::eq(self.target.as_ptr(), obj)
    }
}

impl Clone for ObjRef {
    fn clone(&self) -> Self {
        if let Some(obj) = self.target.upgrade() {
            obj.retain_internal();
        }
        Self {
            handle: self.handle,
            target: Weak::clone(&self.target),
        }
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        if let Some(obj) = self.target.upgrade() {
            obj.release_internal();
        }
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({})", self.handle)
    }
}
