//! Runtime configuration

use std::sync::Arc;
use std::time::Duration;

use crate::value::{PluginResolver, PluginTable};

/// Configuration fixed when a [`Runtime`](crate::Runtime) is created.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long the autorelease queue keeps an object alive
    pub autorelease_delay: Duration,

    /// Maps plugin indices to names for foreign-reference tokens
    pub plugins: Arc<dyn PluginResolver>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            autorelease_delay: Duration::from_secs(10),
            plugins: Arc::new(PluginTable::default()),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with a custom autorelease delay.
    pub fn with_autorelease_delay(delay: Duration) -> Self {
        Self {
            autorelease_delay: delay,
            ..Default::default()
        }
    }

    /// Create a configuration with a host plugin resolver.
    pub fn with_plugins(plugins: Arc<dyn PluginResolver>) -> Self {
        Self {
            plugins,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::new();
        assert_eq!(config.autorelease_delay, Duration::from_secs(10));
        assert_eq!(config.plugins.plugin_index("Skyrim.esm"), None);
    }

    #[test]
    fn test_with_plugins() {
        let table = PluginTable::new(["Skyrim.esm", "Update.esm"]);
        let config = RuntimeConfig::with_plugins(Arc::new(table));
        assert_eq!(config.plugins.plugin_index("update.esm"), Some(1));
        assert_eq!(config.autorelease_delay, Duration::from_secs(10));
    }
}
