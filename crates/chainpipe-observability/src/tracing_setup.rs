//! Tracing / logging initialisation helpers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level, e.g. `chainpipe-filter: debug`
    #[serde(default)]
    pub components: IndexMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: IndexMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_component(mut self, component: impl Into<String>, level: impl Into<String>) -> Self {
        self.components.insert(component.into(), level.into());
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// The `EnvFilter` directive string, e.g. `"info,chainpipe_filter=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Invalid directives fall back to `info`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_keep_component_order() {
        let config = LogConfig::default()
            .with_level("warn")
            .with_component("chainpipe-filter", "debug")
            .with_component("chainpipe-output", "trace");
        assert_eq!(
            config.directives(),
            "warn,chainpipe_filter=debug,chainpipe_output=trace"
        );
    }

    #[test]
    fn yaml_defaults() {
        let config: LogConfig = serde_yaml::from_str("json: true").unwrap();
        assert_eq!(config.level, "info");
        assert!(config.components.is_empty());
        assert!(config.json);
    }

    #[test]
    fn second_init_fails() {
        // Only one global subscriber per process; the first call may already
        // have been made by another test in this binary.
        let _ = init_tracing(&LogConfig::default());
        assert!(init_tracing(&LogConfig::default().json(true)).is_err());
    }
}
