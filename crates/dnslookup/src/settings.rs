use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use dns_resolver::transport::DEFAULT_TIMEOUT;
use dns_resolver::ResolverOptions;

/// Runtime settings: from an optional YAML file, then `DNSLOOKUP_*`
/// environment variables.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Settings {
    /// Seconds to wait for each reply before resending.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Port nameservers are queried on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Queries one lookup may send before giving up.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_port() -> u16 {
    ResolverOptions::default().port
}

fn default_max_queries() -> usize {
    ResolverOptions::default().max_queries
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            port: default_port(),
            max_queries: default_max_queries(),
        }
    }
}

impl Settings {
    pub fn new(filename: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(filename) = filename {
            builder = builder.add_source(File::from(filename));
        }
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder
            .add_source(Environment::with_prefix("DNSLOOKUP"))
            .build()?
            .try_deserialize()?;

        if settings.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(settings)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            port: self.port,
            max_queries: self.max_queries,
        }
    }
}
