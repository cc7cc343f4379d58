//! Server settings, layered from file, environment and flags.

use mowa_core::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            engine: EngineConfig::default(),
        }
    }
}

impl Settings {
    /// Load from an explicit file (or `mowa.{toml,yaml,json}` next to the
    /// binary when none is given), then overlay `MOWA_*` environment
    /// variables. Missing sources fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("mowa").required(false)),
        };
        builder = builder.add_source(config::Environment::with_prefix("MOWA").separator("__"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 8000);
        assert!(settings.engine.validate().is_ok());
    }
}
