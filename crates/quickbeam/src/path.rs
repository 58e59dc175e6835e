//! Path resolution
//!
//! A path addresses a slot nested inside a container graph:
//!
//! ```text
//! path     := "" | segment+
//! segment  := "." key          map key, runs until the next "." or "["
//!           | "[" content "]"  array index, int key, map key or form token
//!                              (content runs until the next "]")
//! ```
//!
//! What a bracket means depends on the container it is applied to: an index
//! for arrays and int-keyed maps, a literal key for string maps and a
//! `__formData|…` token for form-keyed maps. The empty path is the root itself.

use std::sync::Arc;

use crate::object::{Key, Object, ObjectKind};
use crate::runtime::Runtime;
use crate::value::{is_form_token, FormId, FromValue, PluginResolver, Value, ValueType};

/// One step of a parsed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// `.key`
    Dot(&'a str),
    /// `[content]`
    Bracket(&'a str),
}

/// How missing intermediate containers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Fail if anything along the way is missing
    Constant,
    /// Create missing (or none) intermediates as empty containers
    Creative,
}

impl From<bool> for Access {
    fn from(create_missing: bool) -> Self {
        if create_missing {
            Access::Creative
        } else {
            Access::Constant
        }
    }
}

/// Split a path into segments; `None` if it is malformed.
pub fn parse(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = path;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            segments.push(Segment::Dot(&after[..end]));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            segments.push(Segment::Bracket(&after[..end]));
            rest = &after[end + 1..];
        } else {
            return None;
        }
    }
    Some(segments)
}

/// The key `segment` addresses inside a container of `kind`.
fn key_for<'a>(
    segment: Segment<'a>,
    kind: ObjectKind,
    plugins: &dyn PluginResolver,
) -> Option<Key<'a>> {
    match (segment, kind) {
        (Segment::Dot(key) | Segment::Bracket(key), ObjectKind::Map) => Some(Key::Str(key)),
        (Segment::Bracket(index), ObjectKind::Array | ObjectKind::IntMap) => {
            index.trim().parse().ok().map(Key::Int)
        }
        (Segment::Bracket(token), ObjectKind::FormMap) => {
            FormId::from_token(token, plugins).map(Key::Form)
        }
        _ => None,
    }
}

/// Map keys are always created on assignment; array items only in creative mode.
fn creates_slot(access: Access, owner: &Object) -> bool {
    access == Access::Creative || !owner.is_array()
}

/// Kind of container to create so that `next` can be applied to it.
fn kind_for(next: Segment<'_>) -> ObjectKind {
    match next {
        Segment::Dot(_) => ObjectKind::Map,
        Segment::Bracket(s) if s.trim().parse::<i32>().is_ok() => ObjectKind::Array,
        Segment::Bracket(s) if is_form_token(s) => ObjectKind::FormMap,
        Segment::Bracket(_) => ObjectKind::Map,
    }
}

impl Runtime {
    /// Walk every segment but the last, returning the container that owns
    /// the final slot together with the key of that slot.
    fn walk<'p>(
        &self,
        root: &Arc<Object>,
        segments: &[Segment<'p>],
        access: Access,
    ) -> Option<(Arc<Object>, Key<'p>)> {
        let (last, intermediate) = segments.split_last()?;
        let plugins = self.plugins();
        let mut current = Arc::clone(root);
        for (i, segment) in intermediate.iter().enumerate() {
            let key = key_for(*segment, current.kind(), plugins)?;
            let next = match access {
                Access::Constant => current.get_obj(key)?,
                Access::Creative => {
                    let kind = kind_for(segments[i + 1]);
                    current.child_or_insert(key, || Some(self.new_object(kind)))?
                }
            };
            current = next;
        }
        let key = key_for(*last, current.kind(), plugins)?;
        Some((current, key))
    }

    /// Run `f` on the slot at `path`. With [`Access::Creative`] missing
    /// intermediates are created first; the final slot is created the way
    /// [`Runtime::solve_set`] creates it.
    ///
    /// The slot is updated under its owner's lock, so a read-modify-write in
    /// `f` is atomic. Returns `None` if the path cannot be followed.
    pub fn visit<R>(
        &self,
        root: &Arc<Object>,
        path: &str,
        access: Access,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Option<R> {
        let segments = parse(path)?;
        let (owner, key) = self.walk(root, &segments, access)?;
        owner.update(key, creates_slot(access, &owner), f)
    }

    /// The value at `path`, or `None` if nothing is there.
    pub fn resolve(&self, root: &Arc<Object>, path: &str) -> Option<Value> {
        let segments = parse(path)?;
        if segments.is_empty() {
            return Some(Value::object(root));
        }
        let (owner, key) = self.walk(root, &segments, Access::Constant)?;
        owner.get(key)
    }

    /// Typed value at `path`, or `default` on a miss or mismatch.
    pub fn solve<T: FromValue>(&self, root: &Arc<Object>, path: &str, default: T) -> T {
        self.resolve(root, path)
            .and_then(|value| T::from_value(&value))
            .unwrap_or(default)
    }

    /// Check if something can be read at `path`
    pub fn has_path(&self, root: &Arc<Object>, path: &str) -> bool {
        self.solved_value_type(root, path) != ValueType::NoValue
    }

    /// Type of the value at `path`; `NoValue` if the path cannot be resolved.
    pub fn solved_value_type(&self, root: &Arc<Object>, path: &str) -> ValueType {
        self.resolve(root, path)
            .map(|value| value.value_type())
            .unwrap_or(ValueType::NoValue)
    }

    /// Integer at `path`, or `default`
    pub fn solve_int(&self, root: &Arc<Object>, path: &str, default: i32) -> i32 {
        self.solve(root, path, default)
    }

    /// Float at `path`, or `default`
    pub fn solve_flt(&self, root: &Arc<Object>, path: &str, default: f32) -> f32 {
        self.solve(root, path, default)
    }

    /// String at `path`, or `default`
    pub fn solve_str(&self, root: &Arc<Object>, path: &str, default: &str) -> String {
        self.solve(root, path, default.to_owned())
    }

    /// Container at `path`
    pub fn solve_obj(&self, root: &Arc<Object>, path: &str) -> Option<Arc<Object>> {
        self.resolve(root, path).and_then(|value| value.as_object())
    }

    /// Foreign reference at `path`, or `default`
    pub fn solve_form(&self, root: &Arc<Object>, path: &str, default: FormId) -> FormId {
        self.solve(root, path, default)
    }

    /// Store `value` at `path`.
    ///
    /// Without `create_missing`, every intermediate container must exist; the
    /// final key of a map is still created, but an array index must exist.
    /// With it, missing or none intermediates are created: a map for `.key`,
    /// an array for `[n]` and a form map for `[__formData|…]`, and an array
    /// index one past the end appends. The empty path cannot be assigned.
    pub fn solve_set(
        &self,
        root: &Arc<Object>,
        path: &str,
        value: impl Into<Value>,
        create_missing: bool,
    ) -> bool {
        let Some(segments) = parse(path) else {
            return false;
        };
        let access = Access::from(create_missing);
        let Some((owner, key)) = self.walk(root, &segments, access) else {
            return false;
        };
        owner.store(key, value.into(), creates_slot(access, &owner))
    }

    /// Add `delta` to the integer at `path` and return the previous value.
    ///
    /// A none slot (or, with `create_missing`, a missing one) starts at 0.
    /// Floats are truncated and stored back as integers. Other kinds are left
    /// untouched and yield `None`.
    pub fn increment_int(
        &self,
        root: &Arc<Object>,
        path: &str,
        delta: i32,
        create_missing: bool,
    ) -> Option<i32> {
        let segments = parse(path)?;
        let access = Access::from(create_missing);
        let (owner, key) = self.walk(root, &segments, access)?;
        owner
            .update(key, creates_slot(access, &owner), |slot| {
                let previous = match &*slot {
                    Value::None => 0,
                    other => other.as_int()?,
                };
                *slot = Value::Int(previous.wrapping_add(delta));
                Some(previous)
            })
            .flatten()
    }

    /// Float counterpart of [`Runtime::increment_int`].
    pub fn increment_flt(
        &self,
        root: &Arc<Object>,
        path: &str,
        delta: f32,
        create_missing: bool,
    ) -> Option<f32> {
        let segments = parse(path)?;
        let access = Access::from(create_missing);
        let (owner, key) = self.walk(root, &segments, access)?;
        owner
            .update(key, creates_slot(access, &owner), |slot| {
                let previous = match &*slot {
                    Value::None => 0.0,
                    other => other.as_float()?,
                };
                *slot = Value::Float(previous + delta);
                Some(previous)
            })
            .flatten()
    }
}

/// Append `.key` or `[key]` to `base`, whichever re-parses to the same key.
///
/// `None` for a key holding `]` together with `.` or `[`, which neither form
/// can spell.
pub(crate) fn push_map_key(base: &str, key: &str) -> Option<String> {
    if !key.is_empty() && !key.contains(['.', '[']) {
        Some(format!("{base}.{key}"))
    } else if !key.contains(']') {
        Some(format!("{base}[{key}]"))
    } else {
        None
    }
}

/// Append `[content]` to `base`.
pub(crate) fn push_bracket(base: &str, content: impl std::fmt::Display) -> String {
    format!("{base}[{content}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(parse(""), Some(vec![]));
        assert_eq!(
            parse(".a.b[3][x.y]"),
            Some(vec![
                Segment::Dot("a"),
                Segment::Dot("b"),
                Segment::Bracket("3"),
                Segment::Bracket("x.y"),
            ])
        );
        assert_eq!(
            parse("[__formData|Skyrim.esm|0x14].k"),
            Some(vec![
                Segment::Bracket("__formData|Skyrim.esm|0x14"),
                Segment::Dot("k"),
            ])
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for path in ["a", ".", "..a", ".a.", "[", "[1", ".a[0"] {
            assert_eq!(parse(path), None, "{path}");
        }
    }

    #[test]
    fn test_push_map_key() {
        assert_eq!(push_map_key("", "name").as_deref(), Some(".name"));
        assert_eq!(push_map_key(".a", "x.y").as_deref(), Some(".a[x.y]"));
        assert_eq!(push_map_key("", "").as_deref(), Some("[]"));
        assert_eq!(push_map_key("", "a]b").as_deref(), Some(".a]b"));
        assert_eq!(parse(".a]b"), Some(vec![Segment::Dot("a]b")]));
        assert_eq!(push_map_key("", "a]b.c"), None);
        assert_eq!(push_map_key("", "[x]"), None);
        assert_eq!(parse("[]"), Some(vec![Segment::Bracket("")]));
        assert_eq!(push_bracket(".a", 2), ".a[2]");
    }

    #[test]
    fn test_kind_for_next_segment() {
        assert_eq!(kind_for(Segment::Dot("k")), ObjectKind::Map);
        assert_eq!(kind_for(Segment::Bracket("-1")), ObjectKind::Array);
        assert_eq!(kind_for(Segment::Bracket("__formData||0xff000001")), ObjectKind::FormMap);
        assert_eq!(kind_for(Segment::Bracket("key")), ObjectKind::Map);
    }

    #[test]
    fn test_resolve_nested() {
        let rt = Runtime::new();
        let root = rt.new_map();
        let list = rt.array_from_values([10, 20, 30]);
        root.set("list", &list);
        root.set("name", "quickbeam");

        assert_eq!(rt.solve_int(&root, ".list[1]", 0), 20);
        assert_eq!(rt.solve_int(&root, ".list[-1]", 0), 30);
        assert_eq!(rt.solve_int(&root, ".LIST[5]", -1), -1);
        assert_eq!(rt.solve_str(&root, "[name]", ""), "quickbeam");
        assert_eq!(rt.solved_value_type(&root, ".list"), ValueType::Object);
        assert_eq!(rt.solved_value_type(&root, ".missing.deeper"), ValueType::NoValue);
        assert!(rt.solve_obj(&root, "").is_some_and(|r| Arc::ptr_eq(&r, &root)));
        assert!(!rt.has_path(&root, "not a path"));
    }

    #[test]
    fn test_creative_set_builds_structure() {
        let rt = Runtime::new();
        let root = rt.new_map();

        assert!(!rt.solve_set(&root, ".keyA.keyB", 10, false));
        assert!(rt.solve_set(&root, ".keyA.keyB", 10, true));
        assert_eq!(rt.solve_int(&root, ".keyA.keyB", 0), 10);

        assert!(rt.solve_set(&root, ".list[0].name", "first", true));
        assert!(rt.solve_obj(&root, ".list").is_some_and(|l| l.is_array()));
        assert_eq!(rt.solve_str(&root, ".list[0].name", ""), "first");

        // Constant mode may add a map key, never an array item
        assert!(rt.solve_set(&root, ".keyA.other", 1, false));
        assert!(!rt.solve_set(&root, ".list[1]", 1, false));
        assert!(!rt.solve_set(&root, "", 1, true));
    }

    #[test]
    fn test_form_map_segments() {
        let plugins = crate::value::PluginTable::new(["Skyrim.esm"]);
        let rt = Runtime::with_config(crate::RuntimeConfig::with_plugins(Arc::new(plugins)));
        let root = rt.new_map();

        assert!(rt.solve_set(&root, ".forms[__formData|Skyrim.esm|0x14]", 5, true));
        let forms = rt.solve_obj(&root, ".forms");
        assert!(forms.as_ref().is_some_and(|f| f.is_form_map()));
        assert_eq!(
            forms.map(|f| f.get_int(FormId::construct(0, 0x14), 0)),
            Some(5)
        );
        assert_eq!(rt.solve_int(&root, ".forms[__formData|Unknown.esp|0x14]", -1), -1);
    }

    #[test]
    fn test_increment() {
        let rt = Runtime::new();
        let root = rt.new_map();
        assert_eq!(rt.increment_int(&root, ".hits", 1, false), Some(0));
        assert_eq!(rt.increment_int(&root, ".hits", 2, false), Some(1));
        assert_eq!(rt.solve_int(&root, ".hits", 0), 3);

        assert_eq!(rt.increment_flt(&root, ".deep.ratio", 0.5, false), None);
        assert_eq!(rt.increment_flt(&root, ".deep.ratio", 0.5, true), Some(0.0));
        assert_eq!(rt.solve_flt(&root, ".deep.ratio", 0.0), 0.5);

        root.set("text", "x");
        assert_eq!(rt.increment_int(&root, ".text", 1, false), None);
        assert_eq!(rt.solve_str(&root, ".text", ""), "x");
    }
}
