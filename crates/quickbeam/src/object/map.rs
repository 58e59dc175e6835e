//! Keyed-map operations shared by the string, form and integer variants

use std::hash::{Hash, Hasher};
use std::ops::Bound;
use std::sync::Arc;

use super::{Contents, Key, Object};
use crate::value::Value;

/// String map key. Compares and hashes ASCII case-insensitively but keeps
/// the spelling it was first inserted with.
#[derive(Clone)]
pub struct MapKey(Arc<str>);

impl MapKey {
    /// The key as first spelled
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xFF);
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey(Arc::from(s))
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey(Arc::from(s))
    }
}

impl std::fmt::Debug for MapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl Contents {
    fn key_values(&self) -> Vec<Value> {
        match self {
            Contents::Array(_) => Vec::new(),
            Contents::Map(map) => map.keys().map(|k| Value::string(k.as_str())).collect(),
            Contents::FormMap(map) => map.keys().map(|id| Value::Form(*id)).collect(),
            Contents::IntMap(map) => map.keys().map(|k| Value::Int(*k)).collect(),
        }
    }
}

impl Object {
    /// Every key in iteration order: insertion order for string maps,
    /// ascending for form and int maps. Empty for arrays.
    pub fn all_keys(&self) -> Vec<Value> {
        self.lock().contents.key_values()
    }

    /// Every value in iteration order
    pub fn all_values(&self) -> Vec<Value> {
        self.lock().contents.values().cloned().collect()
    }

    /// The key after `previous`, or the first key when `previous` is `None`.
    ///
    /// Returns `None` past the last key or when `previous` is not present.
    pub fn next_key(&self, previous: Option<Key<'_>>) -> Option<Value> {
        let state = self.lock();
        match (&state.contents, previous) {
            (Contents::Map(map), None) => map.first().map(|(k, _)| Value::string(k.as_str())),
            (Contents::Map(map), Some(Key::Str(s))) => {
                let at = map.get_index_of(&MapKey::from(s))?;
                map.get_index(at + 1).map(|(k, _)| Value::string(k.as_str()))
            }
            (Contents::FormMap(map), None) => map.keys().next().map(|id| Value::Form(*id)),
            (Contents::FormMap(map), Some(Key::Form(id))) => map
                .range((Bound::Excluded(id), Bound::Unbounded))
                .next()
                .map(|(k, _)| Value::Form(*k)),
            (Contents::IntMap(map), None) => map.keys().next().map(|k| Value::Int(*k)),
            (Contents::IntMap(map), Some(Key::Int(n))) => map
                .range((Bound::Excluded(n), Bound::Unbounded))
                .next()
                .map(|(k, _)| Value::Int(*k)),
            _ => None,
        }
    }

    /// Copy every pair of `source` into this map. Existing keys are only
    /// replaced when `overwrite` is set.
    ///
    /// Both maps must have the same kind. Merging a map into itself is a no-op.
    pub fn add_pairs(&self, source: &Object, overwrite: bool) -> bool {
        if std::ptr::eq(self, source) || self.kind() != source.kind() || self.is_array() {
            return false;
        }
        let replaced = {
            let (mut target, source) = Object::lock_pair(self, source);
            let mut replaced = Vec::new();
            match (&mut target.contents, &source.contents) {
                (Contents::Map(dst), Contents::Map(src)) => {
                    for (k, v) in src {
                        merge(dst.entry(k.clone()), v, overwrite, &mut replaced);
                    }
                }
                (Contents::FormMap(dst), Contents::FormMap(src)) => {
                    for (k, v) in src {
                        merge_ordered(dst.entry(*k), v, overwrite, &mut replaced);
                    }
                }
                (Contents::IntMap(dst), Contents::IntMap(src)) => {
                    for (k, v) in src {
                        merge_ordered(dst.entry(*k), v, overwrite, &mut replaced);
                    }
                }
                _ => return false,
            }
            replaced
        };
        drop(replaced);
        true
    }
}

fn merge(
    entry: indexmap::map::Entry<'_, MapKey, Value>,
    value: &Value,
    overwrite: bool,
    replaced: &mut Vec<Value>,
) {
    use indexmap::map::Entry;
    match entry {
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
        }
        Entry::Occupied(mut slot) if overwrite => {
            replaced.push(slot.insert(value.clone()));
        }
        Entry::Occupied(_) => {}
    }
}

fn merge_ordered<K: Ord>(
    entry: std::collections::btree_map::Entry<'_, K, Value>,
    value: &Value,
    overwrite: bool,
    replaced: &mut Vec<Value>,
) {
    use std::collections::btree_map::Entry;
    match entry {
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
        }
        Entry::Occupied(mut slot) if overwrite => {
            replaced.push(slot.insert(value.clone()));
        }
        Entry::Occupied(_) => {}
    }
}
