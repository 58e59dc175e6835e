//! The runtime context: registry, autorelease queue, database root and config

use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::config::RuntimeConfig;
use crate::lifetime::{teardown, AutoreleaseQueue, ClaimKind};
use crate::object::{Contents, Object, ObjectKind};
use crate::registry::{Handle, Registry};
use crate::value::{ObjRef, PluginResolver, Value};

pub(crate) struct Shared {
    pub(crate) registry: Registry,
    pub(crate) queue: AutoreleaseQueue,
    /// Pin on the database root
    pub(crate) database: Mutex<Option<ObjRef>>,
    pub(crate) config: RuntimeConfig,
    /// Serializes collection passes
    pub(crate) collecting: Mutex<()>,
    /// Claims are taken under the read side; a collection pass holds the
    /// write side while it decides which objects die.
    pub(crate) claim_gate: RwLock<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.queue.shutdown();
        let pin = self.database.get_mut().take();
        drop(pin);
        let killed = teardown(self.registry.drain());
        debug!("runtime dropped, {} objects destroyed", killed);
    }
}

/// A container runtime.
///
/// Cloning is cheap and every clone addresses the same objects. The objects,
/// the autorelease worker and the database root live until the last clone
/// is dropped, at which point every remaining object is destroyed.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) shared: Arc<Shared>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("objects", &self.object_count())
            .field("pending_autoreleases", &self.pending_autoreleases())
            .finish()
    }
}

impl Runtime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with custom settings.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let queue = AutoreleaseQueue::start(config.autorelease_delay);
        Self {
            shared: Arc::new(Shared {
                registry: Registry::new(),
                queue,
                database: Mutex::new(None),
                config,
                collecting: Mutex::new(()),
                claim_gate: RwLock::new(()),
            }),
        }
    }

    /// The settings this runtime was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Plugin resolver used for foreign-reference tokens
    pub fn plugins(&self) -> &dyn PluginResolver {
        self.shared.config.plugins.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Construction
    // ═══════════════════════════════════════════════════════════════════

    /// Create an empty container of `kind`.
    ///
    /// The new object starts with external count 0 and one autorelease claim,
    /// so it dies after the autorelease delay unless something retains or
    /// references it.
    pub fn new_object(&self, kind: ObjectKind) -> Arc<Object> {
        let runtime = Arc::downgrade(&self.shared);
        let obj = self
            .shared
            .registry
            .insert_new(|handle| Arc::new(Object::new(handle, kind, runtime)));
        debug!("created {:?} #{}", kind, obj.handle());
        self.shared.queue.enqueue(&obj, ClaimKind::Grace);
        obj
    }

    /// Register an empty container under a given handle, for restoring a
    /// saved state. No autorelease claim is taken.
    pub(crate) fn restore_object(&self, handle: Handle, kind: ObjectKind) -> Option<Arc<Object>> {
        let runtime = Arc::downgrade(&self.shared);
        self.shared
            .registry
            .insert_at(handle, |handle| Arc::new(Object::new(handle, kind, runtime)))
    }

    /// Take a fresh autorelease claim on `obj`.
    pub(crate) fn grant_grace(&self, obj: &Arc<Object>) {
        self.shared.queue.enqueue(obj, ClaimKind::Grace);
    }

    /// Create an empty array
    pub fn new_array(&self) -> Arc<Object> {
        self.new_object(ObjectKind::Array)
    }

    /// Create an empty string-keyed map
    pub fn new_map(&self) -> Arc<Object> {
        self.new_object(ObjectKind::Map)
    }

    /// Create an empty form-keyed map
    pub fn new_form_map(&self) -> Arc<Object> {
        self.new_object(ObjectKind::FormMap)
    }

    /// Create an empty int-keyed map
    pub fn new_int_map(&self) -> Arc<Object> {
        self.new_object(ObjectKind::IntMap)
    }

    /// Create an array holding `size` none values.
    pub fn array_with_size(&self, size: usize) -> Arc<Object> {
        let arr = self.new_array();
        arr.replace_contents(Contents::Array(vec![Value::None; size]));
        arr
    }

    /// Create an array from any values convertible to [`Value`].
    pub fn array_from_values<I, V>(&self, values: I) -> Arc<Object>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let arr = self.new_array();
        arr.replace_contents(Contents::Array(
            values.into_iter().map(Into::into).collect(),
        ));
        arr
    }

    /// New array with the items of `source` in `[start, end)`.
    pub fn sub_array(&self, source: &Object, start: i32, end: i32) -> Option<Arc<Object>> {
        let items = source.slice(start, end)?;
        Some(self.array_from_values(items))
    }

    /// New array with every key of `map`
    pub fn all_keys(&self, map: &Object) -> Option<Arc<Object>> {
        (!map.is_array()).then(|| self.array_from_values(map.all_keys()))
    }

    /// New array with every value of `map`
    pub fn all_values(&self, map: &Object) -> Option<Arc<Object>> {
        (!map.is_array()).then(|| self.array_from_values(map.all_values()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registry access
    // ═══════════════════════════════════════════════════════════════════

    /// Look up a live object by handle
    pub fn get_object(&self, handle: Handle) -> Option<Arc<Object>> {
        self.shared.registry.get(handle)
    }

    /// Check if `handle` addresses a live object
    pub fn is_exists(&self, handle: Handle) -> bool {
        self.get_object(handle).is_some()
    }

    /// Number of registered objects
    pub fn object_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Every live object for which `pred` holds, ordered by handle.
    ///
    /// `pred` runs with no registry lock held and may lock the object.
    pub fn objects_matching(&self, pred: impl Fn(&Object) -> bool) -> Vec<Arc<Object>> {
        self.shared
            .registry
            .snapshot()
            .into_iter()
            .filter(|obj| obj.is_alive() && pred(obj))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Database root
    // ═══════════════════════════════════════════════════════════════════

    /// The database root, created as an empty map on first use.
    ///
    /// The root is pinned: it stays alive and is a collection root until it is
    /// replaced with [`Runtime::set_database`].
    pub fn database(&self) -> Arc<Object> {
        let mut pin = self.shared.database.lock();
        if let Some(root) = pin.as_ref().and_then(ObjRef::upgrade) {
            return root;
        }
        let root = self.new_map();
        let stale = pin.replace(ObjRef::claim(&root));
        drop(pin);
        drop(stale);
        debug!("created database root #{}", root.handle());
        root
    }

    /// Replace the database root; `None` unpins it.
    ///
    /// The old root gets a fresh autorelease claim before its pin goes, so a
    /// script still holding its handle can rescue it.
    pub fn set_database(&self, root: Option<&Arc<Object>>) {
        let pin = root.and_then(ObjRef::try_claim);
        let old = std::mem::replace(&mut *self.shared.database.lock(), pin);
        if let Some(old_root) = old.as_ref().and_then(ObjRef::upgrade) {
            if !root.is_some_and(|r| Arc::ptr_eq(r, &old_root)) {
                self.shared.queue.enqueue(&old_root, ClaimKind::Grace);
            }
        }
        drop(old);
    }

    /// Check if a database root exists, without creating one
    pub fn has_database(&self) -> bool {
        self.shared
            .database
            .lock()
            .as_ref()
            .and_then(ObjRef::upgrade)
            .is_some()
    }

    pub(crate) fn database_handle(&self) -> Option<Handle> {
        self.shared
            .database
            .lock()
            .as_ref()
            .and_then(ObjRef::upgrade)
            .map(|root| root.handle())
    }

    /// Destroy every object and forget the database root.
    pub fn clear_state(&self) {
        let pin = self.shared.database.lock().take();
        drop(pin);
        self.shared.queue.clear();
        let killed = teardown(self.shared.registry.drain());
        debug!("state cleared, {} objects destroyed", killed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_objects_are_registered() {
        let rt = Runtime::new();
        let arr = rt.new_array();
        let map = rt.new_map();
        assert_ne!(arr.handle(), map.handle());
        assert!(rt.is_exists(arr.handle()));
        assert!(rt.get_object(map.handle()).is_some_and(|m| m.is_map()));
        assert_eq!(rt.object_count(), 2);
        assert_eq!(arr.external_count(), 0);
        assert_eq!(arr.internal_count(), 1);
    }

    #[test]
    fn test_array_constructors() {
        let rt = Runtime::new();
        let sized = rt.array_with_size(3);
        assert_eq!(sized.count(), 3);
        assert_eq!(sized.value_type(2), crate::ValueType::None);

        let flags = rt.array_from_values([true, false]);
        assert_eq!(flags.items(), vec![Value::Int(1), Value::Int(0)]);

        let src = rt.array_from_values([1, 2, 3, 4]);
        let sub = rt.sub_array(&src, 1, 3);
        assert_eq!(
            sub.map(|s| s.items()),
            Some(vec![Value::Int(2), Value::Int(3)])
        );
        assert!(rt.sub_array(&src, 3, 1).is_none());
    }

    #[test]
    fn test_keys_and_values_as_arrays() {
        let rt = Runtime::new();
        let map = rt.new_map();
        map.set("a", 1);
        map.set("b", "two");
        let keys = rt.all_keys(&map).map(|k| k.items());
        assert_eq!(keys, Some(vec![Value::string("a"), Value::string("b")]));
        let values = rt.all_values(&map).map(|v| v.count());
        assert_eq!(values, Some(2));
        assert!(rt.all_keys(&rt.new_array()).is_none());
    }

    #[test]
    fn test_database_is_created_once() {
        let rt = Runtime::new();
        assert!(!rt.has_database());
        let db = rt.database();
        assert!(Arc::ptr_eq(&db, &rt.database()));
        assert!(db.is_map());
        assert_eq!(rt.database_handle(), Some(db.handle()));
    }

    #[test]
    fn test_set_database_regrants_old_root() {
        let rt = Runtime::new();
        let old = rt.database();
        rt.zero_lifetime(&old);
        assert!(old.is_alive());

        let new_root = rt.new_map();
        rt.set_database(Some(&new_root));
        assert!(Arc::ptr_eq(&rt.database(), &new_root));
        // Pin is gone but the fresh grace claim keeps it alive for now
        assert!(old.is_alive());
        rt.zero_lifetime(&old);
        assert!(!old.is_alive());

        rt.set_database(None);
        assert!(!rt.has_database());
    }

    #[test]
    fn test_clear_state() {
        let rt = Runtime::new();
        let arr = rt.new_array();
        rt.retain(&arr, None);
        rt.database().set("arr", &arr);

        rt.clear_state();
        assert_eq!(rt.object_count(), 0);
        assert!(!arr.is_alive());
        assert_eq!(rt.pending_autoreleases(), 0);
        assert!(!rt.has_database());
    }

    #[test]
    fn test_drop_destroys_everything() {
        let rt = Runtime::new();
        let arr = rt.new_array();
        rt.retain(&arr, None);
        arr.push(&arr);
        drop(rt);
        assert!(!arr.is_alive());
    }
}
