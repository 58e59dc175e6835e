//! Value representation for container contents

mod display;
mod form;
mod ordering;
mod refs;

pub use form::{
    is_form_token, is_valid_plugin_name, FormId, PluginResolver, PluginTable, FORM_PREFIX,
};
pub use refs::ObjRef;

use std::sync::Arc;

use crate::object::Object;

/// A single unit stored inside a container.
///
/// The kind set is closed: a container holds nothing but these six kinds.
/// `Object` is a non-owning edge to another container; see [`ObjRef`].
#[derive(Clone, Default)]
pub enum Value {
    /// No value
    #[default]
    None,

    /// 32-bit signed integer
    Int(i32),

    /// 32-bit float
    Float(f32),

    /// Immutable shared string
    String(Arc<str>),

    /// Opaque reference into the host engine
    Form(FormId),

    /// Edge to another container
    Object(ObjRef),
}

/// Type codes reported to the host for a resolved slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueType {
    /// Nothing could be resolved at all
    NoValue = 0,
    /// A slot exists but holds no value
    None = 1,
    /// Integer
    Int = 2,
    /// Float
    Float = 3,
    /// Foreign reference
    Form = 4,
    /// Container
    Object = 5,
    /// String
    String = 6,
}

impl ValueType {
    /// Numeric code as exposed to scripts.
    pub fn code(self) -> i32 {
        self as i32
    }
}

// ═══════════════════════════════════════════════════════════════════
// Constructors and predicates
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Create a container edge. Claims the target for as long as the value
    /// lives; an edge to a destroyed container is `Value::None`.
    pub fn object(obj: &Arc<Object>) -> Self {
        ObjRef::try_claim(obj).map_or(Value::None, Value::Object)
    }

    /// Create a foreign reference. The zero id is the host's "no form" and
    /// becomes `Value::None`.
    pub fn form(id: FormId) -> Self {
        if id.is_zero() {
            Value::None
        } else {
            Value::Form(id)
        }
    }

    /// Type code of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Form(_) => ValueType::Form,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Check if the value is empty
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Check if value is an integer or a float
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Check if the value is a container edge
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors (return Option for safe access)
    // ═══════════════════════════════════════════════════════════════════

    /// Read as integer; floats are truncated
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i32),
            _ => None,
        }
    }

    /// Read as float; integers are widened
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Int(n) => Some(*n as f32),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the foreign reference
    pub fn as_form(&self) -> Option<FormId> {
        match self {
            Value::Form(id) => Some(*id),
            _ => None,
        }
    }

    /// The container this value points at, if it is still alive.
    pub fn as_object(&self) -> Option<Arc<Object>> {
        match self {
            Value::Object(r) => r.upgrade(),
            _ => None,
        }
    }

    /// The edge itself, without upgrading it
    pub fn as_obj_ref(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Identity test: both values are edges to the same live container.
    pub fn is_same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.same_target(b),
            _ => false,
        }
    }
}

/// Typed extraction used by the `get_*` / `solve_*` families.
pub trait FromValue: Sized {
    /// Convert, or `None` on a kind mismatch
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FromValue for FormId {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_form()
    }
}

impl FromValue for Arc<Object> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_object()
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Trait Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

// Scripts have no boolean slot kind; booleans are stored as 0/1.
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(b as i32)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<FormId> for Value {
    fn from(id: FormId) -> Self {
        Value::form(id)
    }
}

impl From<&Arc<Object>> for Value {
    fn from(obj: &Arc<Object>) -> Self {
        Value::object(obj)
    }
}

impl From<Option<&Arc<Object>>> for Value {
    fn from(obj: Option<&Arc<Object>>) -> Self {
        obj.map(Value::object).unwrap_or_default()
    }
}
