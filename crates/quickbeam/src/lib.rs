//! # Quickbeam
//!
//! An embeddable runtime of dynamically-typed containers for a host scripting
//! engine.
//!
//! Scripts create arrays and maps, address them by integer handles, nest them
//! into arbitrary graphs (shared children and cycles included) and save the
//! whole thing alongside the host's own save data.
//!
//! ## Architecture
//!
//! - **Values**: none, int, float, string, foreign reference or container edge
//! - **Containers**: arrays and three map flavours (string, form and int keys)
//! - **Registry**: handle to object lookup, the only strong owner of objects
//! - **Lifetime**: script retains, internal claims from edges, an autorelease
//!   queue and a mark-and-sweep collector for unreachable cycles
//! - **Paths**: `.key[0].other` style addressing with optional creation
//! - **Serialization**: JSON documents and binary state streams, both
//!   preserving shared and cyclic structure
//!
//! ## Example
//!
//! ```
//! use quickbeam::Runtime;
//!
//! let rt = Runtime::new();
//! let root = rt.object_from_json(r#"{ "player": { "level": 3 } }"#).unwrap();
//! assert_eq!(rt.solve_int(&root, ".player.level", 0), 3);
//!
//! rt.solve_set(&root, ".player.perks[0]", "sneak", true);
//! assert_eq!(rt.solve_str(&root, ".player.perks[0]", ""), "sneak");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod object;
pub mod path;
pub mod registry;
pub mod runtime;
pub mod serialize;
pub mod value;

mod collector;
mod copy;
mod lifetime;

// Re-export main types
pub use config::RuntimeConfig;
pub use error::{QuickbeamError, Result};
pub use object::{Key, MapKey, Object, ObjectKind};
pub use path::{Access, Segment};
pub use registry::Handle;
pub use runtime::Runtime;
pub use serialize::{extract_path, StreamVersion, REFERENCE_PREFIX};
pub use value::{FormId, FromValue, ObjRef, PluginResolver, PluginTable, Value, ValueType};

/// Quickbeam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
