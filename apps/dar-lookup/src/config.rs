use anyhow::{Context, Result};
use dar_client::DarClientConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `DAR__CLIENT__BASE_URL`
pub const ENV_PREFIX: &str = "DAR__";

/// Effective configuration of the `dar-lookup` tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LookupConfig {
    pub client: DarClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of text.
    pub json: bool,
}

/// Values given on the command line; unset fields leave lower layers alone.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub chunk_size: Option<usize>,
    pub json_logs: Option<bool>,
}

impl LookupConfig {
    /// Layered load: defaults, then the YAML file, then `DAR__*` environment
    /// variables, then command-line overrides.
    ///
    /// # Errors
    /// Fails when the file is missing or any layer does not deserialize.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(base_url) = &overrides.base_url {
            figment = figment.merge(Serialized::default("client.base_url", base_url));
        }
        if let Some(chunk_size) = overrides.chunk_size {
            figment = figment.merge(Serialized::default("client.chunk_size", chunk_size));
        }
        if let Some(json) = overrides.json_logs {
            figment = figment.merge(Serialized::default("logging.json", json));
        }

        figment
            .extract()
            .context("failed to load dar-lookup configuration")
    }

    /// Render as YAML for `print-config`
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).context("failed to render configuration as YAML")
    }
}
