use std::env;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Postgresql connection URI postgresql://[userspec@][hostspec][/dbname][?paramspec]
    pub connection_uri: String,
}

impl PostgresConfig {
    pub fn new(uri: &str) -> Self {
        Self {
            connection_uri: uri.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub url: String,
    /// Time to wait between node polls once synced, in milliseconds
    pub poll_interval_ms: u64,
}

impl NodeConfig {
    pub fn new(url: &str, poll_interval_ms: u64) -> Self {
        Self {
            url: url.to_owned(),
            poll_interval_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub node: NodeConfig,
    pub monitor_port: u16,
}

impl Config {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
    pub const DEFAULT_MONITOR_PORT: u16 = 3005;

    /// Reads config from `TW_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        let pg_uri = required("TW_POSTGRES_URI")?;
        let node_url = required("TW_NODE_URL")?;
        let poll_interval_ms = optional("TW_POLL_INTERVAL_MS", Self::DEFAULT_POLL_INTERVAL_MS)?;
        let monitor_port = optional("TW_MONITOR_PORT", Self::DEFAULT_MONITOR_PORT)?;
        Ok(Self {
            postgres: PostgresConfig::new(&pg_uri),
            node: NodeConfig::new(&node_url, poll_interval_ms),
            monitor_port,
        })
    }
}

fn required(key: &str) -> Result<String, Error> {
    let value = env::var(key).map_err(|_| Error::Config(format!("missing {key}")))?;
    tracing::debug!("found {key} environment variable");
    Ok(value)
}

fn optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(s) => s
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {s}"))),
        Err(_) => Ok(default),
    }
}
