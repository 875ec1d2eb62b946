//! Server configuration.
//!
//! All settings come from the command line. The same struct is handed to
//! [`Server::bind`](crate::server::Server::bind), so tests build it directly
//! with struct update syntax over [`Config::default`].

use crate::{DEFAULT_HOST, DEFAULT_POOL_SIZE, DEFAULT_PORT};
use clap::Parser;

/// Command-line configuration for the server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "framecho")]
#[command(version)]
#[command(about = "Bounded worker-pool TCP server for the ^...$ increment-echo protocol", long_about = None)]
pub struct Config {
    /// Interface to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of connections processed at once
    #[arg(short = 'n', long = "workers", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            pool_size: DEFAULT_POOL_SIZE,
            log_level: "info".to_string(),
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    #[error("host must not be empty")]
    EmptyHost,
}

impl Config {
    /// Checks the values clap cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
