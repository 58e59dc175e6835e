//! Error types for Quickbeam serialization and state restore

use thiserror::Error;

/// Main error type for Quickbeam operations.
///
/// Container getters and path lookups never produce these: a bad handle,
/// a type mismatch or an out-of-range index yields a default value instead.
/// Errors are reserved for malformed external data.
#[derive(Error, Debug)]
pub enum QuickbeamError {
    /// The text document could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a byte stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document parsed, but its top level is not an array or object
    #[error("Document root is {found}, expected an array or object")]
    NotAContainer {
        /// JSON kind found at the top level
        found: &'static str,
    },

    /// A container graph nests deeper than a JSON document may
    #[error("Document nests deeper than {limit} levels")]
    TooDeep {
        /// Deepest nesting allowed
        limit: usize,
    },

    /// The binary stream does not start with the expected magic bytes
    #[error("Stream error: bad magic {found:?}")]
    BadMagic {
        /// The four bytes actually read
        found: [u8; 4],
    },

    /// The binary stream carries a version this build cannot read
    #[error("Stream error: unsupported version {0}")]
    UnsupportedVersion(u32),

    /// An object record names an unknown container kind
    #[error("Stream error: unknown container kind {0}")]
    UnknownKind(u8),

    /// A value record carries an unknown type tag
    #[error("Stream error: unknown value tag {0}")]
    UnknownValueTag(u8),

    /// A string in the stream is not valid UTF-8
    #[error("Stream error: invalid UTF-8 string")]
    InvalidUtf8,

    /// The same handle appears twice in one stream
    #[error("Stream error: duplicate handle {0}")]
    DuplicateHandle(u32),

    /// The database root handle does not name an object in the stream
    #[error("Stream error: database root {0} is not an object in this stream")]
    BadRoot(u32),
}

/// Result type alias for Quickbeam operations
pub type Result<T> = std::result::Result<T, QuickbeamError>;

/// Human-readable name of a JSON value's kind, used in error messages.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
