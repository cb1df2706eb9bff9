//! Layered configuration: a TOML file plus `CURIO_`-prefixed environment
//! overrides, composed through the `config` crate.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::score::ScoreWeights;

/// One configured upstream media-server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceSettings {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Lower numbers win when picking the primary of a duplicate group.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    /// Locally routable prefix that proxied upstream media URLs are
    /// rewritten onto.
    #[serde(default = "default_proxy_path")]
    pub proxy_path: String,
    #[serde(default)]
    pub instances: Vec<InstanceSettings>,
    #[serde(default)]
    pub scoring: ScoreWeights,
}

fn default_proxy_path() -> String {
    "/proxy/media".to_string()
}

impl Settings {
    /// Loads settings from an optional TOML file, then applies
    /// environment overrides (`CURIO_DATABASE_URL`, `CURIO_PROXY_PATH`,
    /// nested keys with `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("CURIO").separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_defaults_apply() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                database_url = "postgresql://localhost/curio"
                [[instances]]
                id = "alpha"
                base_url = "https://alpha.example"
                priority = 1
                [[instances]]
                id = "beta"
                base_url = "https://beta.example"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.proxy_path, "/proxy/media");
        assert_eq!(settings.instances[0].priority, 1);
        assert_eq!(settings.instances[1].priority, 100);
        assert!(settings.instances[1].enabled);
    }
}
