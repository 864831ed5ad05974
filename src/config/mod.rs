use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path};

use crate::util::AcceptBackoff;

/// Env var that overrides the publisher-facing address.
pub const PUBLISHERS_ENV: &str = "PUBLISHERS_PORT";
/// Env var that overrides the consumer-facing address.
pub const CONSUMERS_ENV: &str = "CONSUMERS_PORT";
/// Env var naming the config file; beats `--config`.
pub const CONFIG_ENV: &str = "RELAYMQ_CONFIG";
/// Config file picked up from the working directory when none is named.
pub const DEFAULT_CONFIG_PATH: &str = "relaymq.toml";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Publisher-facing address, host optional (`":3000"`).
    pub publishers_addr: String,
    /// Consumer-facing address, host optional (`":3001"`).
    pub consumers_addr: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfig {
    pub accept_backoff_min_ms: u64,
    pub accept_backoff_max_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            accept_backoff_min_ms: 5,
            accept_backoff_max_ms: 1000,
        }
    }
}

impl ListenerConfig {
    pub fn accept_backoff(&self) -> AcceptBackoff {
        AcceptBackoff::new(
            Duration::from_millis(self.accept_backoff_min_ms),
            Duration::from_millis(self.accept_backoff_max_ms),
        )
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                publishers_addr: ":3000".into(),
                consumers_addr: ":3001".into(),
            },
            listener: ListenerConfig::default(),
        }
    }
}

impl Config {
    /// Applies `PUBLISHERS_PORT` / `CONSUMERS_PORT` when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(PUBLISHERS_ENV).filter(|v| !v.is_empty()) {
            self.server.publishers_addr = v;
        }
        if let Some(v) = lookup(CONSUMERS_ENV).filter(|v| !v.is_empty()) {
            self.server.consumers_addr = v;
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    parse_config(&raw)
}

/// Loads the named config file, or `relaymq.toml` when none is named.
///
/// A named file must exist. Only the implicit default may be absent, in
/// which case the built-in defaults are used.
pub fn load_or_default(named: Option<&str>) -> Result<Config, anyhow::Error> {
    load_or_default_from(named, Path::new(DEFAULT_CONFIG_PATH))
}

fn load_or_default_from(named: Option<&str>, fallback: &Path) -> Result<Config, anyhow::Error> {
    match named {
        Some(path) => load_config(path).with_context(|| format!("config file {path}")),
        None if fallback.exists() => load_config(fallback)
            .with_context(|| format!("config file {}", fallback.display())),
        None => Ok(Config::default()),
    }
}

pub fn parse_config(raw: &str) -> Result<Config, anyhow::Error> {
    let config: Config = toml::from_str(raw)?;
    Ok(config)
}
