//! Foreign references: opaque host-engine ids and their textual tokens
//!
//! A token looks like `__formData|<plugin>|0x<hex>`. Static ids carry their
//! plugin index in the high byte, which the host resolves to a plugin name;
//! dynamic ids (high byte `0xFF`) are written with an empty qualifier and the
//! full id: `__formData||0xff000014`.

use std::fmt;

/// Prefix shared by every foreign-reference token
pub const FORM_PREFIX: &str = "__formData";

/// Separator between token fields
pub const SEPARATOR: char = '|';

const DYNAMIC_PREFIX: u8 = 0xFF;
const LOCAL_MASK: u32 = 0x00FF_FFFF;

/// An opaque 32-bit foreign reference with a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FormId(pub u32);

impl FormId {
    /// The host's "no form" id
    pub const ZERO: FormId = FormId(0);

    /// Build an id from a plugin index and a plugin-local id.
    pub fn construct(plugin_index: u8, local_id: u32) -> Self {
        FormId((plugin_index as u32) << 24 | (local_id & LOCAL_MASK))
    }

    /// Raw id
    pub fn raw(self) -> u32 {
        self.0
    }

    /// High byte: the plugin index (or the dynamic prefix)
    pub fn plugin_index(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Low 24 bits
    pub fn local_id(self) -> u32 {
        self.0 & LOCAL_MASK
    }

    /// Check for the "no form" id
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Allocated at runtime by the host rather than defined by a plugin
    pub fn is_dynamic(self) -> bool {
        self.plugin_index() == DYNAMIC_PREFIX
    }

    /// Defined by a plugin
    pub fn is_static(self) -> bool {
        !self.is_dynamic()
    }

    /// Encode as a `__formData|…` token.
    ///
    /// Returns `None` for the zero id, for a plugin index the resolver does not
    /// know, and for a plugin name containing characters outside the accepted
    /// set; a corrupt token is never produced.
    pub fn to_token(self, plugins: &dyn PluginResolver) -> Option<String> {
        if self.is_zero() {
            return None;
        }
        if self.is_dynamic() {
            return Some(format!("{FORM_PREFIX}{SEPARATOR}{SEPARATOR}0x{:x}", self.0));
        }
        let name = plugins.plugin_name(self.plugin_index())?;
        if !is_valid_plugin_name(&name) {
            return None;
        }
        Some(format!(
            "{FORM_PREFIX}{SEPARATOR}{name}{SEPARATOR}0x{:x}",
            self.local_id()
        ))
    }

    /// Decode a `__formData|…` token; `None` if it is malformed or names an
    /// unknown plugin.
    pub fn from_token(token: &str, plugins: &dyn PluginResolver) -> Option<Self> {
        let rest = token.strip_prefix(FORM_PREFIX)?.strip_prefix(SEPARATOR)?;
        let (qualifier, hex) = rest.split_once(SEPARATOR)?;
        let digits = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))?;
        let raw = u32::from_str_radix(digits, 16).ok()?;

        if qualifier.is_empty() {
            let id = FormId(raw);
            return (id.is_dynamic() && !id.is_zero()).then_some(id);
        }

        if !is_valid_plugin_name(qualifier) || raw > LOCAL_MASK {
            return None;
        }
        let index = plugins.plugin_index(qualifier)?;
        if index == DYNAMIC_PREFIX {
            return None;
        }
        let id = FormId::construct(index, raw);
        (!id.is_zero()).then_some(id)
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Cheap check used before attempting a full decode.
pub fn is_form_token(s: &str) -> bool {
    s.strip_prefix(FORM_PREFIX)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Plugin names are file names: letters, digits and a handful of punctuation.
/// Path delimiters and the token separator are rejected.
pub fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, ' ' | '_' | '-' | '.' | '\'' | '(' | ')' | '&' | '!' | '+' | ',')
        })
}

/// Host-side mapping between plugin indices and plugin names.
///
/// The host engine owns the load order; the runtime only asks it to translate.
pub trait PluginResolver: Send + Sync + fmt::Debug {
    /// Name of the plugin loaded at `index`
    fn plugin_name(&self, index: u8) -> Option<String>;

    /// Load-order index of the plugin called `name`
    fn plugin_index(&self, name: &str) -> Option<u8>;
}

/// A fixed load order: the plugin at position `i` has index `i`.
#[derive(Debug, Clone, Default)]
pub struct PluginTable {
    names: Vec<String>,
}

impl PluginTable {
    /// Create a table from plugin names in load order.
    ///
    /// Names beyond index `0xFE` are ignored; `0xFF` is the dynamic prefix.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .take(DYNAMIC_PREFIX as usize)
                .map(Into::into)
                .collect(),
        }
    }

    /// Number of known plugins
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if no plugin is known
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl PluginResolver for PluginTable {
    fn plugin_name(&self, index: u8) -> Option<String> {
        self.names.get(index as usize).cloned()
    }

    fn plugin_index(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .and_then(|i| u8::try_from(i).ok())
    }
}
