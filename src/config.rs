//! # Configuration Module
//!
//! Settings for the HTTP server and the RPC client, loaded from YAML and
//! overridden from the environment.
//!
//! ## File Format
//!
//! ```yaml
//! server:
//!   driver: may_minihttp
//!   host: 0.0.0.0
//!   port: 8080
//!   root: /api          # optional, stripped before route matching
//! client:
//!   host: rpc.example.com
//!   port: 8443          # optional
//!   path: /RPC2         # optional, default /RPC2
//!   secure: true        # optional, https when true
//!   timeout_secs: 10    # optional, default 30
//! ```
//!
//! Both sections are optional and every key has a default.
//!
//! ## Environment Variables
//!
//! | Variable           | Effect                                             |
//! |--------------------|----------------------------------------------------|
//! | `RPCR_SERVER_HOST` | overrides `server.host`                            |
//! | `RPCR_SERVER_PORT` | overrides `server.port`                            |
//! | `RPCR_STACK_SIZE`  | coroutine stack size, decimal or `0x` hex (16 KB)  |
//!
//! Larger stacks support deeper handler call chains; smaller stacks reduce
//! memory per concurrent connection (stack size × connections).

use crate::error::ConfigError;
use crate::rpc::DEFAULT_RPC_PATH;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{info, warn};

/// The only transport driver this crate ships
pub const DEFAULT_DRIVER: &str = "may_minihttp";

/// Default coroutine stack size (16 KB)
pub const DEFAULT_STACK_SIZE: usize = 0x4000;

fn default_driver() -> String {
    DEFAULT_DRIVER.to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    DEFAULT_RPC_PATH.to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

/// `server:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix stripped from requests before matching
    #[serde(default)]
    pub root: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            host: default_host(),
            port: default_port(),
            root: None,
        }
    }
}

impl ServerConfig {
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedDriver`] unless the driver is `may_minihttp`
    /// (or its alias `minihttp`).
    pub fn check_driver(&self) -> Result<(), ConfigError> {
        match self.driver.as_str() {
            DEFAULT_DRIVER | "minihttp" => Ok(()),
            other => Err(ConfigError::UnsupportedDriver(other.to_owned())),
        }
    }

    /// `host:port`
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `client:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            path: default_path(),
            secure: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// A plain-HTTP client config for `host:port` with the default path
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            ..Self::default()
        }
    }

    /// `http(s)://host[:port]/path`
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{scheme}://{}{port}{path}", self.host)
    }
}

/// The whole configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl AppConfig {
    /// Parse a YAML document (no environment overrides)
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] on invalid YAML or unknown keys.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Read a YAML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when the file cannot be read or parsed, or an
    /// override is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_yaml_str(&yaml)?;
        config.apply_env_overrides()?;
        info!(
            path = %path.display(),
            server_addr = %config.server.addr(),
            driver = %config.server.driver,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply `RPCR_SERVER_HOST` / `RPCR_SERVER_PORT`
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when `RPCR_SERVER_PORT` is not a port number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("RPCR_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("RPCR_SERVER_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::Load(format!("RPCR_SERVER_PORT={port}: {e}")))?;
        }
        Ok(())
    }
}

/// Coroutine runtime settings, read from the environment at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000)
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = match env::var("RPCR_STACK_SIZE") {
            Ok(val) => parse_stack_size(&val).unwrap_or_else(|| {
                warn!(value = %val, "Ignoring invalid RPCR_STACK_SIZE");
                DEFAULT_STACK_SIZE
            }),
            Err(_) => DEFAULT_STACK_SIZE,
        };
        RuntimeConfig { stack_size }
    }

    /// Configure the `may` runtime; call before starting any server
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
        info!(stack_size = self.stack_size, "Coroutine stack size configured");
    }
}

fn parse_stack_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
