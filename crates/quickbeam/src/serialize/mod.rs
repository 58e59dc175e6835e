//! Saving and loading container graphs
//!
//! Two formats are supported:
//!
//! - **JSON documents** for a single graph, readable and editable by hand.
//!   Shared and cyclic containers are written once and referred to by path.
//! - **Binary state streams** for the whole runtime, including handles,
//!   retain counts, tags and the database root.

mod json;
mod reference;
mod stream;

pub use json::{parse_document, INT_MAP_MARKER, MAX_DEPTH};
pub use reference::{extract_path, token as reference_token, REFERENCE_PREFIX};
pub use stream::{StreamVersion, CURRENT_VERSION, MAGIC};

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use log::warn;

use crate::error::Result;
use crate::object::Object;
use crate::runtime::Runtime;

impl Runtime {
    // ═══════════════════════════════════════════════════════════════════
    // JSON
    // ═══════════════════════════════════════════════════════════════════

    /// Parse a JSON document, reporting why it failed.
    pub fn parse_json(&self, text: &str) -> Result<Arc<Object>> {
        parse_document(self, text)
    }

    /// Parse a JSON document; `None` if it is malformed or its top level is
    /// not an array or object.
    pub fn object_from_json(&self, text: &str) -> Option<Arc<Object>> {
        match self.parse_json(text) {
            Ok(obj) => Some(obj),
            Err(err) => {
                warn!("rejected JSON document: {}", err);
                None
            }
        }
    }

    /// Build a container from a prototype: JSON text that scripts write
    /// inline. Same rules as [`Runtime::object_from_json`].
    pub fn object_from_prototype(&self, prototype: &str) -> Option<Arc<Object>> {
        self.object_from_json(prototype)
    }

    /// Build a container from an already parsed JSON tree.
    pub fn object_from_json_value(&self, json: &serde_json::Value) -> Result<Arc<Object>> {
        json::Reader::new(self).read(json)
    }

    /// JSON tree for `obj` and everything reachable from it.
    ///
    /// Fails with [`QuickbeamError::TooDeep`](crate::QuickbeamError::TooDeep)
    /// when containers nest more than [`MAX_DEPTH`] levels.
    pub fn to_json(&self, obj: &Arc<Object>) -> Result<serde_json::Value> {
        json::Writer::new(self.plugins()).write(obj)
    }

    /// Pretty-printed JSON text for `obj`.
    pub fn to_json_string(&self, obj: &Arc<Object>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json(obj)?)?)
    }

    /// Read a JSON file; `None` if it cannot be read or parsed.
    pub fn read_json_file(&self, path: impl AsRef<Path>) -> Option<Arc<Object>> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => self.object_from_json(&text),
            Err(err) => {
                warn!("cannot read {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Write `obj` as pretty-printed JSON to a file, creating parent
    /// directories as needed.
    pub fn write_json_file(&self, obj: &Arc<Object>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_string(obj)?)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binary state
    // ═══════════════════════════════════════════════════════════════════

    /// Write the whole runtime state as a binary stream.
    pub fn write_state(&self, out: impl Write) -> Result<()> {
        stream::write_state(self, out)
    }

    /// [`Runtime::write_state`] into a fresh buffer
    pub fn state_to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_state(&mut bytes)?;
        Ok(bytes)
    }

    /// Replace the whole runtime state with a binary stream.
    ///
    /// The stream is parsed completely before anything changes; on error the
    /// current state is left as it was.
    pub fn read_state(&self, input: impl Read, version: StreamVersion) -> Result<()> {
        stream::read_state(self, input, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_object_from_json_rejects_garbage() {
        let rt = Runtime::new();
        assert!(rt.object_from_json("").is_none());
        assert!(rt.object_from_json("{ not json").is_none());
        assert!(rt.object_from_json("\"just a string\"").is_none());
        assert!(rt.object_from_prototype("[1, 2]").is_some_and(|a| a.count() == 2));
    }

    #[test]
    fn test_to_json_string_is_pretty() {
        let rt = Runtime::new();
        let arr = rt.array_from_values([1, 2]);
        assert_eq!(rt.to_json_string(&arr).unwrap(), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("quickbeam-json-{}", std::process::id()));
        let file = dir.join("nested").join("doc.json");

        let rt = Runtime::new();
        let doc = rt.object_from_json(r#"{ "a": [1, 2.5, "x"], "b": {} }"#).unwrap();
        rt.write_json_file(&doc, &file).unwrap();

        let loaded = rt.read_json_file(&file).unwrap();
        assert_eq!(rt.to_json(&loaded).unwrap(), json!({ "a": [1, 2.5, "x"], "b": {} }));
        assert!(rt.read_json_file(dir.join("missing.json")).is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_state_bytes_start_with_header() {
        let rt = Runtime::new();
        rt.database();
        let bytes = rt.state_to_bytes().unwrap();
        assert_eq!(&bytes[..4], &MAGIC);
        assert_eq!(&bytes[4..8], &CURRENT_VERSION.to_le_bytes());
    }
}
