//! Back-reference tokens: `__reference|<path>`

/// Prefix shared by every back-reference token
pub const REFERENCE_PREFIX: &str = "__reference";

/// Path carried by a `__reference|…` token. The empty path is the document
/// root.
pub fn extract_path(token: &str) -> Option<&str> {
    token.strip_prefix(REFERENCE_PREFIX)?.strip_prefix('|')
}

/// Build the token pointing at `path`
pub fn token(path: &str) -> String {
    format!("{REFERENCE_PREFIX}|{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_path() {
        assert_eq!(extract_path("__reference|"), Some(""));
        assert_eq!(extract_path("__reference|anyString"), Some("anyString"));
        assert_eq!(extract_path("__reference||anyString"), Some("|anyString"));
        assert_eq!(extract_path("__reference"), None);
        assert_eq!(extract_path(""), None);
        assert_eq!(extract_path("__"), None);
    }

    #[test]
    fn test_token() {
        assert_eq!(token(""), "__reference|");
        assert_eq!(extract_path(&token(".a[0]")), Some(".a[0]"));
    }
}
