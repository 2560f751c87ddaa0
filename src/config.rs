//! Configuration for resplink
//!
//! Centralized configuration with sensible defaults. Hosts usually
//! deserialize this from their own config files; the builder covers
//! programmatic setup and tests.

use serde::Deserialize;

use crate::error::{LinkError, Result};

/// Default backend port
pub const DEFAULT_PORT: u16 = 6379;

/// Largest bulk payload accepted from a backend (512 MiB)
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Connection parameters for one named backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Name callers use to look the backend up
    pub name: String,

    /// Hostname or IP address (IPv6 literals allowed)
    pub host: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database index selected right after connecting
    #[serde(default)]
    pub db: u32,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, db: u32) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            db,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Main configuration for a resplink instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Configured backends, unique by name
    pub backends: Vec<BackendConfig>,

    /// Name announced with `CLIENT SETNAME` on every new connection
    pub client_name: String,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Read timeout applied while a socket is in blocking mode (milliseconds)
    pub read_timeout_ms: u64,

    /// Write timeout applied while a socket is in blocking mode (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Largest bulk length the decoder accepts before declaring a desync
    pub max_bulk_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            client_name: "resplink".to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Check invariants the registry relies on
    pub fn validate(&self) -> Result<()> {
        for (i, backend) in self.backends.iter().enumerate() {
            if backend.name.is_empty() {
                return Err(LinkError::Config(format!("backend #{} has no name", i)));
            }
            if backend.host.is_empty() {
                return Err(LinkError::Config(format!(
                    "backend '{}' has no host",
                    backend.name
                )));
            }
            if self.backends[..i].iter().any(|b| b.name == backend.name) {
                return Err(LinkError::Config(format!(
                    "backend '{}' is configured twice",
                    backend.name
                )));
            }
        }
        if self.client_name.chars().any(char::is_whitespace) {
            return Err(LinkError::Config(
                "client_name must not contain whitespace".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add a backend
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backends.push(backend);
        self
    }

    /// Set the name announced with `CLIENT SETNAME`
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the maximum accepted bulk length (in bytes)
    pub fn max_bulk_len(mut self, len: usize) -> Self {
        self.config.max_bulk_len = len;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
