//! Containers: arrays, string-keyed maps, form-keyed maps and int-keyed maps

mod array;
mod counts;
mod map;

pub use map::MapKey;

pub(crate) use array::{read_index, write_index};
pub(crate) use counts::{RefCounts, Release};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};

use crate::registry::Handle;
use crate::runtime::Shared;
use crate::value::{FormId, FromValue, ObjRef, Value, ValueType};

/// Which of the four container shapes an object has. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Ordered sequence of values
    Array,
    /// Case-insensitive string keys, insertion ordered
    Map,
    /// Foreign-reference keys
    FormMap,
    /// Integer keys
    IntMap,
}

impl ObjectKind {
    pub(crate) fn code(self) -> u8 {
        match self {
            ObjectKind::Array => 0,
            ObjectKind::Map => 1,
            ObjectKind::FormMap => 2,
            ObjectKind::IntMap => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ObjectKind::Array),
            1 => Some(ObjectKind::Map),
            2 => Some(ObjectKind::FormMap),
            3 => Some(ObjectKind::IntMap),
            _ => None,
        }
    }
}

/// Address of a slot inside a container.
///
/// `Int` is an index for arrays (negative counts from the end) and a key for
/// int-keyed maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    /// Array index or integer key
    Int(i32),
    /// String key
    Str(&'a str),
    /// Foreign-reference key
    Form(FormId),
}

impl From<i32> for Key<'_> {
    fn from(n: i32) -> Self {
        Key::Int(n)
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(s: &'a str) -> Self {
        Key::Str(s)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(s: &'a String) -> Self {
        Key::Str(s)
    }
}

impl From<FormId> for Key<'_> {
    fn from(id: FormId) -> Self {
        Key::Form(id)
    }
}

/// Owned form of [`Key`], for remembering a slot across lock scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KeyBuf {
    Int(i32),
    Str(String),
    Form(FormId),
}

impl KeyBuf {
    pub(crate) fn as_key(&self) -> Key<'_> {
        match self {
            KeyBuf::Int(n) => Key::Int(*n),
            KeyBuf::Str(s) => Key::Str(s),
            KeyBuf::Form(id) => Key::Form(*id),
        }
    }
}

/// Backing storage, one variant per [`ObjectKind`].
#[derive(Clone)]
pub(crate) enum Contents {
    Array(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    FormMap(BTreeMap<FormId, Value>),
    IntMap(BTreeMap<i32, Value>),
}

impl Contents {
    pub(crate) fn empty(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Array => Contents::Array(Vec::new()),
            ObjectKind::Map => Contents::Map(IndexMap::new()),
            ObjectKind::FormMap => Contents::FormMap(BTreeMap::new()),
            ObjectKind::IntMap => Contents::IntMap(BTreeMap::new()),
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            Contents::Array(_) => ObjectKind::Array,
            Contents::Map(_) => ObjectKind::Map,
            Contents::FormMap(_) => ObjectKind::FormMap,
            Contents::IntMap(_) => ObjectKind::IntMap,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Contents::Array(items) => items.len(),
            Contents::Map(map) => map.len(),
            Contents::FormMap(map) => map.len(),
            Contents::IntMap(map) => map.len(),
        }
    }

    /// All stored values, in storage order
    pub(crate) fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Contents::Array(items) => Box::new(items.iter()),
            Contents::Map(map) => Box::new(map.values()),
            Contents::FormMap(map) => Box::new(map.values()),
            Contents::IntMap(map) => Box::new(map.values()),
        }
    }

    /// Rebuild with every value passed through `f`, keys untouched.
    pub(crate) fn map_values(self, mut f: impl FnMut(Value) -> Value) -> Self {
        match self {
            Contents::Array(items) => Contents::Array(items.into_iter().map(f).collect()),
            Contents::Map(map) => Contents::Map(map.into_iter().map(|(k, v)| (k, f(v))).collect()),
            Contents::FormMap(map) => {
                Contents::FormMap(map.into_iter().map(|(k, v)| (k, f(v))).collect())
            }
            Contents::IntMap(map) => {
                Contents::IntMap(map.into_iter().map(|(k, v)| (k, f(v))).collect())
            }
        }
    }

    /// Read access to a slot; `None` if the key does not fit this kind or
    /// the slot does not exist.
    pub(crate) fn slot(&self, key: Key<'_>) -> Option<&Value> {
        match (self, key) {
            (Contents::Array(items), Key::Int(index)) => {
                read_index(index, items.len()).map(|i| &items[i])
            }
            (Contents::IntMap(map), Key::Int(k)) => map.get(&k),
            (Contents::Map(map), Key::Str(s)) => map.get(&MapKey::from(s)),
            (Contents::FormMap(map), Key::Form(id)) => map.get(&id),
            _ => None,
        }
    }

    /// Write access to a slot. With `create`, a missing map key is inserted
    /// as none and an array index one past the end appends a none.
    pub(crate) fn slot_mut(&mut self, key: Key<'_>, create: bool) -> Option<&mut Value> {
        match (self, key) {
            (Contents::Array(items), Key::Int(index)) => {
                if let Some(i) = read_index(index, items.len()) {
                    return items.get_mut(i);
                }
                if create && write_index(index, items.len()) == Some(items.len()) {
                    items.push(Value::None);
                    return items.last_mut();
                }
                None
            }
            (Contents::IntMap(map), Key::Int(k)) => {
                if create {
                    Some(map.entry(k).or_default())
                } else {
                    map.get_mut(&k)
                }
            }
            (Contents::Map(map), Key::Str(s)) => {
                let key = MapKey::from(s);
                if create {
                    Some(map.entry(key).or_default())
                } else {
                    map.get_mut(&key)
                }
            }
            (Contents::FormMap(map), Key::Form(id)) if !id.is_zero() => {
                if create {
                    Some(map.entry(id).or_default())
                } else {
                    map.get_mut(&id)
                }
            }
            _ => None,
        }
    }

    /// Remove a slot, handing back the old value.
    pub(crate) fn remove(&mut self, key: Key<'_>) -> Option<Value> {
        match (self, key) {
            (Contents::Array(items), Key::Int(index)) => {
                read_index(index, items.len()).map(|i| items.remove(i))
            }
            (Contents::IntMap(map), Key::Int(k)) => map.remove(&k),
            (Contents::Map(map), Key::Str(s)) => map.shift_remove(&MapKey::from(s)),
            (Contents::FormMap(map), Key::Form(id)) => map.remove(&id),
            _ => None,
        }
    }
}

pub(crate) struct ObjectState {
    pub(crate) contents: Contents,
    pub(crate) tag: Option<String>,
}

/// A container registered with a [`Runtime`](crate::Runtime).
///
/// Every operation takes the object's lock for its whole duration, so each
/// call is atomic on its own; nothing is atomic across calls. Reference counts
/// live outside the lock (see `counts.rs`), which is what lets a container be
/// stored into itself while its lock is held.
///
/// Getters never fail: a kind mismatch, a missing key or an index out of range
/// yields `None` or the caller's default.
pub struct Object {
    handle: Handle,
    kind: ObjectKind,
    pub(crate) counts: RefCounts,
    state: Mutex<ObjectState>,
    pub(crate) runtime: Weak<Shared>,
}

impl Object {
    pub(crate) fn new(handle: Handle, kind: ObjectKind, runtime: Weak<Shared>) -> Self {
        Self {
            handle,
            kind,
            counts: RefCounts::new(),
            state: Mutex::new(ObjectState {
                contents: Contents::empty(kind),
                tag: None,
            }),
            runtime,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock()
    }

    /// Lock two distinct objects in handle order.
    ///
    /// Callers must short-circuit `a` and `b` being the same object first;
    /// the guards come back in argument order.
    pub(crate) fn lock_pair<'a>(
        a: &'a Object,
        b: &'a Object,
    ) -> (MutexGuard<'a, ObjectState>, MutexGuard<'a, ObjectState>) {
        debug_assert!(!std::ptr::eq(a, b));
        if a.handle <= b.handle {
            let first = a.lock();
            let second = b.lock();
            (first, second)
        } else {
            let second = b.lock();
            let first = a.lock();
            (first, second)
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Identity and introspection
    // ═══════════════════════════════════════════════════════════════════

    /// The object's handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The object's shape
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Check if this is an array
    pub fn is_array(&self) -> bool {
        self.kind == ObjectKind::Array
    }

    /// Check if this is a string-keyed map
    pub fn is_map(&self) -> bool {
        self.kind == ObjectKind::Map
    }

    /// Check if this is a form-keyed map
    pub fn is_form_map(&self) -> bool {
        self.kind == ObjectKind::FormMap
    }

    /// Check if this is an int-keyed map
    pub fn is_int_map(&self) -> bool {
        self.kind == ObjectKind::IntMap
    }

    /// `false` once the object has been destroyed
    pub fn is_alive(&self) -> bool {
        !self.counts.is_dead()
    }

    /// Outstanding script retains
    pub fn external_count(&self) -> u32 {
        self.counts.external()
    }

    /// Outstanding internal claims: edges, pins and autorelease entries
    pub fn internal_count(&self) -> u32 {
        self.counts.internal()
    }

    /// Owner tag used for bulk release
    pub fn tag(&self) -> Option<String> {
        self.lock().tag.clone()
    }

    /// Set or clear the owner tag
    pub fn set_tag(&self, tag: Option<&str>) {
        self.lock().tag = tag.filter(|t| !t.is_empty()).map(str::to_owned);
    }

    /// Check the owner tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.lock().tag.as_deref() == Some(tag)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Common container operations
    // ═══════════════════════════════════════════════════════════════════

    /// Number of items
    pub fn count(&self) -> usize {
        self.lock().contents.len()
    }

    /// Check if the container has no items
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Remove every item
    pub fn clear(&self) {
        let old = {
            let mut state = self.lock();
            std::mem::replace(&mut state.contents, Contents::empty(self.kind))
        };
        drop(old);
    }

    /// Value at `key`
    pub fn get<'k>(&self, key: impl Into<Key<'k>>) -> Option<Value> {
        self.lock().contents.slot(key.into()).cloned()
    }

    /// Value at `key` converted to `T`, or `default` on a miss or mismatch.
    pub fn get_as<'k, T: FromValue>(&self, key: impl Into<Key<'k>>, default: T) -> T {
        self.get(key)
            .and_then(|value| T::from_value(&value))
            .unwrap_or(default)
    }

    /// Integer at `key`, or `default`
    pub fn get_int<'k>(&self, key: impl Into<Key<'k>>, default: i32) -> i32 {
        self.get_as(key, default)
    }

    /// Float at `key`, or `default`
    pub fn get_flt<'k>(&self, key: impl Into<Key<'k>>, default: f32) -> f32 {
        self.get_as(key, default)
    }

    /// String at `key`, or `default`
    pub fn get_str<'k>(&self, key: impl Into<Key<'k>>, default: &str) -> String {
        self.get_as(key, default.to_owned())
    }

    /// Container at `key`, if it holds one
    pub fn get_obj<'k>(&self, key: impl Into<Key<'k>>) -> Option<Arc<Object>> {
        self.get(key).and_then(|value| value.as_object())
    }

    /// Foreign reference at `key`, or `default`
    pub fn get_form<'k>(&self, key: impl Into<Key<'k>>, default: FormId) -> FormId {
        self.get_as(key, default)
    }

    /// Store `value` at `key`.
    ///
    /// Maps insert or overwrite; arrays only replace an existing index (use
    /// `insert`/`push` to grow them). Returns `false` if nothing was stored.
    pub fn set<'k>(&self, key: impl Into<Key<'k>>, value: impl Into<Value>) -> bool {
        self.store(key.into(), value.into(), !self.is_array())
    }

    /// Store into a slot; with `create`, missing map keys are added and an
    /// array index one past the end appends.
    pub(crate) fn store(&self, key: Key<'_>, value: Value, create: bool) -> bool {
        let old = self.update(key, create, |slot| std::mem::replace(slot, value));
        old.is_some()
    }

    /// Run `f` on a slot under the lock. Whatever `f` returns is dropped
    /// after the lock is released.
    pub(crate) fn update<R>(
        &self,
        key: Key<'_>,
        create: bool,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        if let Some(slot) = state.contents.slot_mut(key, create) {
            return Some(f(slot));
        }
        drop(state);
        drop(f);
        None
    }

    /// The container at `key`, creating one with `make` when the slot is
    /// missing or holds none. Runs under this object's lock, so concurrent
    /// callers agree on a single child.
    ///
    /// `make` must not lock any other container.
    pub(crate) fn child_or_insert(
        &self,
        key: Key<'_>,
        make: impl FnOnce() -> Option<Arc<Object>>,
    ) -> Option<Arc<Object>> {
        let mut state = self.lock();
        let slot = state.contents.slot_mut(key, true)?;
        if let Some(existing) = slot.as_object() {
            return Some(existing);
        }
        if !slot.is_none() {
            return None;
        }
        let child = make()?;
        *slot = Value::object(&child);
        Some(child)
    }

    /// Check if `key` addresses an existing slot
    pub fn has_key<'k>(&self, key: impl Into<Key<'k>>) -> bool {
        self.lock().contents.slot(key.into()).is_some()
    }

    /// Remove the slot at `key`. Returns `true` if something was removed.
    pub fn remove<'k>(&self, key: impl Into<Key<'k>>) -> bool {
        let old = self.lock().contents.remove(key.into());
        old.is_some()
    }

    /// Type of the value at `key`; `NoValue` if there is no such slot.
    pub fn value_type<'k>(&self, key: impl Into<Key<'k>>) -> ValueType {
        self.lock()
            .contents
            .slot(key.into())
            .map(Value::value_type)
            .unwrap_or(ValueType::NoValue)
    }

    /// Live containers this object points at, for graph walks.
    pub(crate) fn child_objects(&self) -> Vec<Arc<Object>> {
        self.lock()
            .contents
            .values()
            .filter_map(Value::as_object)
            .collect()
    }

    /// Copy of the contents, taken under the lock.
    pub(crate) fn snapshot(&self) -> Contents {
        self.lock().contents.clone()
    }

    /// Swap in new contents; the old ones are dropped after the lock is released.
    pub(crate) fn replace_contents(&self, contents: Contents) {
        let old = std::mem::replace(&mut self.lock().contents, contents);
        drop(old);
    }

    /// Empty the object for destruction, returning what it held.
    pub(crate) fn take_contents(&self) -> Contents {
        std::mem::replace(&mut self.lock().contents, Contents::empty(self.kind))
    }

    /// Check if `value` is an edge to this very object
    pub(crate) fn is_self(&self, value: &Value) -> bool {
        value.as_obj_ref().is_some_and(|r: &ObjRef| r.points_to(self))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("external", &self.external_count())
            .field("internal", &self.internal_count())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(kind: ObjectKind) -> Arc<Object> {
        Arc::new(Object::new(Handle(1), kind, Weak::new()))
    }

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in [
            ObjectKind::Array,
            ObjectKind::Map,
            ObjectKind::FormMap,
            ObjectKind::IntMap,
        ] {
            assert_eq!(ObjectKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ObjectKind::from_code(9), None);
    }

    #[test]
    fn test_key_kind_mismatch_is_a_miss() {
        let map = detached(ObjectKind::Map);
        assert!(map.set("a", 1));
        assert!(!map.set(0, 1));
        assert_eq!(map.get(0), None);
        assert_eq!(map.get_int("a", -1), 1);
        assert_eq!(map.get_str("a", "dflt"), "dflt");
    }

    #[test]
    fn test_int_map_keys() {
        let map = detached(ObjectKind::IntMap);
        assert!(map.set(-5, "neg"));
        assert!(map.set(7, 1.5f32));
        assert_eq!(map.get_str(-5, ""), "neg");
        assert_eq!(map.get_flt(7, 0.0), 1.5);
        assert_eq!(map.value_type(8), ValueType::NoValue);
        assert!(map.remove(-5));
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn test_form_map_rejects_zero_form() {
        let map = detached(ObjectKind::FormMap);
        assert!(!map.set(FormId::ZERO, 1));
        assert!(map.set(FormId(0x0100_0001), 1));
        assert!(map.has_key(FormId(0x0100_0001)));
    }

    #[test]
    fn test_tag() {
        let obj = detached(ObjectKind::Array);
        assert_eq!(obj.tag(), None);
        obj.set_tag(Some("owner"));
        assert!(obj.has_tag("owner"));
        obj.set_tag(Some(""));
        assert_eq!(obj.tag(), None);
    }
}
