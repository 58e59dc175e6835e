//! Shallow and deep copies

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::Object;
use crate::registry::Handle;
use crate::runtime::Runtime;
use crate::value::Value;

impl Runtime {
    /// New container with the same items as `source`. Child containers are
    /// shared, not copied.
    pub fn shallow_copy(&self, source: &Object) -> Arc<Object> {
        let copy = self.new_object(source.kind());
        copy.replace_contents(source.snapshot());
        copy
    }

    /// Copy `source` and everything reachable from it.
    ///
    /// Each reachable container is copied exactly once, so sharing and cycles
    /// in the source reappear in the copy between the copied containers.
    pub fn deep_copy(&self, source: &Arc<Object>) -> Arc<Object> {
        let root = self.new_object(source.kind());
        let mut copies: HashMap<Handle, Arc<Object>> = HashMap::new();
        copies.insert(source.handle(), Arc::clone(&root));

        let mut work = vec![(Arc::clone(source), Arc::clone(&root))];
        while let Some((original, copy)) = work.pop() {
            let contents = original.snapshot().map_values(|value| {
                let Some(child) = value.as_object() else {
                    return value;
                };
                let cloned = copies.entry(child.handle()).or_insert_with(|| {
                    let fresh = self.new_object(child.kind());
                    work.push((Arc::clone(&child), Arc::clone(&fresh)));
                    fresh
                });
                Value::object(cloned)
            });
            copy.replace_contents(contents);
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shallow_copy_shares_children() {
        let rt = Runtime::new();
        let child = rt.new_array();
        let map = rt.new_map();
        map.set("child", &child);
        map.set("n", 1);

        let copy = rt.shallow_copy(&map);
        assert!(!Arc::ptr_eq(&copy, &map));
        assert_eq!(copy.get_int("n", 0), 1);
        assert!(copy.get_obj("child").is_some_and(|c| Arc::ptr_eq(&c, &child)));
    }

    #[test]
    fn test_deep_copy_of_self_containing_array() {
        let rt = Runtime::new();
        let root = rt.new_array();
        root.push(&root);

        let copy = rt.deep_copy(&root);
        assert!(!Arc::ptr_eq(&copy, &root));
        assert!(copy.get_obj(0).is_some_and(|c| Arc::ptr_eq(&c, &copy)));
        assert!(root.get_obj(0).is_some_and(|r| Arc::ptr_eq(&r, &root)));
        assert_eq!(root.count(), 1);
    }

    #[test]
    fn test_deep_copy_preserves_sharing() {
        let rt = Runtime::new();
        let shared = rt.new_array();
        let root = rt.new_map();
        root.set("b", &shared);
        root.set("c", &shared);

        let copy = rt.deep_copy(&root);
        let (b, c) = (copy.get("b"), copy.get("c"));
        assert!(b.as_ref().zip(c.as_ref()).is_some_and(|(b, c)| b.is_same_object(c)));
        assert!(!copy.get_obj("b").is_some_and(|b| Arc::ptr_eq(&b, &shared)));
        assert_eq!(rt.object_count(), 4);
    }
}
