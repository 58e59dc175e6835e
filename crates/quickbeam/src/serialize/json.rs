//! JSON documents
//!
//! Containers map onto JSON arrays and objects. Three conventions keep the
//! graph intact:
//!
//! - The second and later occurrences of a container are written as
//!   `"__reference|<path of first occurrence>"`.
//! - Foreign references are written as `"__formData|<plugin>|0x<id>"`.
//! - A form-keyed map carries the marker key `"__formData": null` and uses
//!   tokens as keys; an int-keyed map carries `"__intData": null` and uses
//!   decimal keys.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::warn;
use serde_json::{Map as JsonMap, Number, Value as Json};

use super::reference;
use crate::error::{json_kind, QuickbeamError, Result};
use crate::object::{Contents, KeyBuf, Object};
use crate::path::{push_bracket, push_map_key};
use crate::registry::Handle;
use crate::runtime::Runtime;
use crate::value::{is_form_token, FormId, PluginResolver, Value, FORM_PREFIX};

/// Marker key of an int-keyed map
pub const INT_MAP_MARKER: &str = "__intData";

// ═══════════════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════════════

/// Deepest container nesting a document may have. The JSON parser refuses
/// to read past 128 levels, so anything deeper could not be loaded back.
pub const MAX_DEPTH: usize = 100;

/// Where a child sits in its parent.
enum Step {
    /// Array position
    Index(usize),
    /// String-map key
    Key(String),
    /// Form token or decimal integer key
    Bracket(String),
}

impl Step {
    /// Path of the child, or `None` when the grammar cannot spell it.
    fn path(&self, base: &str) -> Option<String> {
        match self {
            Step::Index(i) => Some(push_bracket(base, i)),
            Step::Key(key) => push_map_key(base, key),
            Step::Bracket(token) => Some(push_bracket(base, token)),
        }
    }
}

enum Building {
    Array(Vec<Json>),
    Object(JsonMap<String, Json>),
}

impl Building {
    fn put(&mut self, step: Step, json: Json) {
        match (self, step) {
            (Building::Array(items), _) => items.push(json),
            (Building::Object(fields), Step::Key(name) | Step::Bracket(name)) => {
                fields.insert(name, json);
            }
            (Building::Object(fields), Step::Index(i)) => {
                fields.insert(i.to_string(), json);
            }
        }
    }

    fn finish(self) -> Json {
        match self {
            Building::Array(items) => Json::Array(items),
            Building::Object(fields) => Json::Object(fields),
        }
    }
}

/// A container whose JSON is being assembled.
struct Frame {
    handle: Handle,
    path: Option<String>,
    /// Slot in the parent; `None` for the root
    step: Option<Step>,
    out: Building,
    entries: std::vec::IntoIter<(Step, Value)>,
}

enum Opened {
    Done(Json),
    Frame(Frame),
}

/// Builds a JSON tree, remembering where each container first appeared.
///
/// The walk keeps its own stack, so the nesting limit is [`MAX_DEPTH`]
/// rather than the thread's stack size.
pub(crate) struct Writer<'a> {
    plugins: &'a dyn PluginResolver,
    seen: HashMap<Handle, String>,
    /// Open containers that sit below a key no path can spell
    unnamed: HashSet<Handle>,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(plugins: &'a dyn PluginResolver) -> Self {
        Self {
            plugins,
            seen: HashMap::new(),
            unnamed: HashSet::new(),
        }
    }

    /// JSON for `root`. Each container is locked only while it is copied.
    pub(crate) fn write(mut self, root: &Arc<Object>) -> Result<Json> {
        let mut stack = match self.open(root, Some(String::new()), 0)? {
            Opened::Done(json) => return Ok(json),
            Opened::Frame(frame) => vec![frame],
        };
        while let Some(top) = stack.last_mut() {
            let Some((step, value)) = top.entries.next() else {
                let Some(frame) = stack.pop() else { break };
                let (step, json) = self.close(frame);
                match (stack.last_mut(), step) {
                    (Some(parent), Some(step)) => parent.out.put(step, json),
                    _ => return Ok(json),
                }
                continue;
            };
            let json = match value.as_object() {
                Some(child) => {
                    let path = top.path.as_deref().and_then(|base| step.path(base));
                    match self.open(&child, path, stack.len())? {
                        Opened::Done(json) => json,
                        Opened::Frame(mut frame) => {
                            frame.step = Some(step);
                            stack.push(frame);
                            continue;
                        }
                    }
                }
                None => self.scalar(&value),
            };
            if let Some(top) = stack.last_mut() {
                top.out.put(step, json);
            }
        }
        Ok(Json::Null)
    }

    fn open(&mut self, obj: &Arc<Object>, path: Option<String>, depth: usize) -> Result<Opened> {
        let handle = obj.handle();
        if let Some(first) = self.seen.get(&handle) {
            return Ok(Opened::Done(Json::String(reference::token(first))));
        }
        if self.unnamed.contains(&handle) {
            warn!("#{} contains itself below a key no path can spell, writing null", handle);
            return Ok(Opened::Done(Json::Null));
        }
        if depth >= MAX_DEPTH {
            return Err(QuickbeamError::TooDeep { limit: MAX_DEPTH });
        }
        // A container below an unspellable key is written in full wherever
        // it appears, since no reference could find it again.
        match &path {
            Some(p) => {
                self.seen.insert(handle, p.clone());
            }
            None => {
                self.unnamed.insert(handle);
            }
        }
        let (out, entries) = self.layout(obj.snapshot());
        Ok(Opened::Frame(Frame {
            handle,
            path,
            step: None,
            out,
            entries: entries.into_iter(),
        }))
    }

    fn close(&mut self, frame: Frame) -> (Option<Step>, Json) {
        if frame.path.is_none() {
            self.unnamed.remove(&frame.handle);
        }
        (frame.step, frame.out.finish())
    }

    fn layout(&self, contents: Contents) -> (Building, Vec<(Step, Value)>) {
        match contents {
            Contents::Array(items) => (
                Building::Array(Vec::with_capacity(items.len())),
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (Step::Index(i), item))
                    .collect(),
            ),
            Contents::Map(map) => {
                let entries = map
                    .into_iter()
                    .filter_map(|(key, item)| {
                        let name = key.as_str();
                        if name == FORM_PREFIX || name == INT_MAP_MARKER {
                            warn!("skipping reserved key {:?} in a string map", name);
                            return None;
                        }
                        Some((Step::Key(name.to_owned()), item))
                    })
                    .collect();
                (Building::Object(JsonMap::new()), entries)
            }
            Contents::FormMap(map) => {
                let mut fields = JsonMap::new();
                fields.insert(FORM_PREFIX.to_owned(), Json::Null);
                let entries = map
                    .into_iter()
                    .filter_map(|(id, item)| match id.to_token(self.plugins) {
                        Some(token) => Some((Step::Bracket(token), item)),
                        None => {
                            warn!("skipping form key {} with no textual encoding", id);
                            None
                        }
                    })
                    .collect();
                (Building::Object(fields), entries)
            }
            Contents::IntMap(map) => {
                let mut fields = JsonMap::new();
                fields.insert(INT_MAP_MARKER.to_owned(), Json::Null);
                let entries = map
                    .into_iter()
                    .map(|(key, item)| (Step::Bracket(key.to_string()), item))
                    .collect();
                (Building::Object(fields), entries)
            }
        }
    }

    fn scalar(&self, value: &Value) -> Json {
        match value {
            Value::None | Value::Object(_) => Json::Null,
            Value::Int(n) => Json::Number(Number::from(*n)),
            // Going through the shortest decimal form keeps 0.1f32 as 0.1
            Value::Float(x) => x
                .to_string()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.to_string()),
            Value::Form(id) => id.to_token(self.plugins).map_or(Json::Null, Json::String),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════════════

/// A `__reference|…` placeholder waiting for the whole tree to exist.
struct Unresolved {
    owner: Arc<Object>,
    key: KeyBuf,
    path: String,
}

/// Builds containers from a JSON tree in two passes: structure first, then
/// back-references resolved against the finished root.
pub(crate) struct Reader<'a> {
    runtime: &'a Runtime,
    unresolved: Vec<Unresolved>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(runtime: &'a Runtime) -> Self {
        Self {
            runtime,
            unresolved: Vec::new(),
        }
    }

    pub(crate) fn read(mut self, json: &Json) -> Result<Arc<Object>> {
        let root = self
            .container(json, 0)?
            .ok_or(QuickbeamError::NotAContainer {
                found: json_kind(json),
            })?;
        self.resolve_references(&root);
        Ok(root)
    }

    fn plugins(&self) -> &dyn PluginResolver {
        self.runtime.plugins()
    }

    /// `None` when `json` is a scalar.
    fn container(&mut self, json: &Json, depth: usize) -> Result<Option<Arc<Object>>> {
        if !matches!(json, Json::Array(_) | Json::Object(_)) {
            return Ok(None);
        }
        if depth >= MAX_DEPTH {
            return Err(QuickbeamError::TooDeep { limit: MAX_DEPTH });
        }
        let container = match json {
            Json::Array(items) => {
                let arr = self.runtime.new_array();
                for (i, item) in items.iter().enumerate() {
                    let index = i32::try_from(i).unwrap_or(i32::MAX);
                    let value = self.item(item, &arr, KeyBuf::Int(index), depth)?;
                    arr.push(value);
                }
                arr
            }
            Json::Object(fields) if fields.contains_key(FORM_PREFIX) => {
                let map = self.runtime.new_form_map();
                for (token, item) in fields {
                    if token == FORM_PREFIX {
                        continue;
                    }
                    match FormId::from_token(token, self.plugins()) {
                        Some(id) => {
                            let value = self.item(item, &map, KeyBuf::Form(id), depth)?;
                            map.set(id, value);
                        }
                        None => warn!("skipping unreadable form key {:?}", token),
                    }
                }
                map
            }
            Json::Object(fields) if fields.contains_key(INT_MAP_MARKER) => {
                let map = self.runtime.new_int_map();
                for (key, item) in fields {
                    if key == INT_MAP_MARKER {
                        continue;
                    }
                    match key.trim().parse::<i32>() {
                        Ok(k) => {
                            let value = self.item(item, &map, KeyBuf::Int(k), depth)?;
                            map.set(k, value);
                        }
                        Err(_) => warn!("skipping non-integer key {:?}", key),
                    }
                }
                map
            }
            Json::Object(fields) => {
                let map = self.runtime.new_map();
                for (key, item) in fields {
                    let value = self.item(item, &map, KeyBuf::Str(key.clone()), depth)?;
                    map.set(key, value);
                }
                map
            }
            _ => return Ok(None),
        };
        Ok(Some(container))
    }

    fn item(
        &mut self,
        json: &Json,
        owner: &Arc<Object>,
        key: KeyBuf,
        depth: usize,
    ) -> Result<Value> {
        Ok(match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::from(*b),
            Json::Number(n) => number(n),
            Json::String(s) => {
                if let Some(path) = reference::extract_path(s) {
                    self.unresolved.push(Unresolved {
                        owner: Arc::clone(owner),
                        key,
                        path: path.to_owned(),
                    });
                    Value::None
                } else if is_form_token(s) {
                    FormId::from_token(s, self.plugins())
                        .map(Value::form)
                        .unwrap_or_default()
                } else {
                    Value::string(s)
                }
            }
            Json::Array(_) | Json::Object(_) => {
                Value::from(self.container(json, depth + 1)?.as_ref())
            }
        })
    }

    /// Fill placeholders until a pass makes no progress. A reference may point
    /// through another reference, so one pass is not always enough.
    fn resolve_references(&mut self, root: &Arc<Object>) {
        let mut pending = std::mem::take(&mut self.unresolved);
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|r| match self.runtime.resolve(root, &r.path) {
                Some(value) if !value.is_none() => {
                    r.owner.store(r.key.as_key(), value, false);
                    false
                }
                _ => true,
            });
            if pending.len() == before {
                break;
            }
        }
        for r in &pending {
            warn!("unresolved reference {:?}", reference::token(&r.path));
        }
    }
}

/// Integral numbers that fit become ints; everything else becomes a float.
fn number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        if let Ok(small) = i32::try_from(i) {
            return Value::Int(small);
        }
    }
    n.as_f64().map_or(Value::None, |x| Value::Float(x as f32))
}

/// Parse a JSON document into a new container graph.
pub fn parse_document(runtime: &Runtime, text: &str) -> Result<Arc<Object>> {
    let json: Json = serde_json::from_str(text)?;
    Reader::new(runtime).read(&json)
}
