//! Configuration loading.
//!
//! `ConsentStoreConfig` is read from a TOML document, then overlaid with
//! `CSTORE_*` environment variables, then checked by `validate()`. Every
//! field has a default, so an empty document is a valid configuration for an
//! in-memory server.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cstore_contracts::{ConsentError, ConsentResult};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CSTORE_";

/// Default SQLite connection string: a private in-memory database.
pub const DEFAULT_CONNECTION_STRING: &str = ":memory:";

/// Default server address (bind address in server mode, target in client mode).
pub const DEFAULT_ADDRESS: &str = "localhost:1323";

/// How the process reaches the consent store.
///
/// Expressed in TOML as `mode = "server"` or `mode = "client"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineMode {
    /// Open the local SQLite store.
    #[default]
    Server,
    /// Proxy every call to a remote instance over HTTP.
    Client,
}

impl FromStr for EngineMode {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            other => Err(ConsentError::Config {
                reason: format!("unknown mode '{}', expected 'server' or 'client'", other),
            }),
        }
    }
}

/// The top-level structure deserialized from a TOML configuration file.
///
/// Example:
/// ```toml
/// mode = "server"
/// connection_string = "consent.db"
/// address = "0.0.0.0:1323"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentStoreConfig {
    pub mode: EngineMode,
    /// SQLite path, `:memory:`, or `file:` URI.
    pub connection_string: String,
    pub address: String,
    /// How long SQLite waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Per-request timeout of the remote client, in milliseconds.
    pub client_timeout_ms: u64,
}

impl Default for ConsentStoreConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Server,
            connection_string: DEFAULT_CONNECTION_STRING.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            busy_timeout_ms: 5_000,
            client_timeout_ms: 1_000,
        }
    }
}

impl ConsentStoreConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `ConsentError::Config` if the TOML is malformed or does not
    /// match the expected schema.
    pub fn from_toml_str(s: &str) -> ConsentResult<Self> {
        toml::from_str(s).map_err(|e| ConsentError::Config {
            reason: format!("failed to parse configuration TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as TOML configuration.
    pub fn from_file(path: &Path) -> ConsentResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConsentError::Config {
            reason: format!("failed to read configuration file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> ConsentResult<()> {
        self.apply_vars(std::env::vars())
    }

    /// Overlay values from `vars`, a sequence of `(name, value)` pairs.
    ///
    /// Names without the `CSTORE_` prefix and unknown keys are ignored.
    pub fn apply_vars<I, K, V>(&mut self, vars: I) -> ConsentResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let Some(key) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();

            match key {
                "MODE" => self.mode = value.parse()?,
                "CONNECTIONSTRING" => self.connection_string = value.to_string(),
                "ADDRESS" => self.address = value.to_string(),
                "BUSY_TIMEOUT_MS" => self.busy_timeout_ms = parse_millis(key, value)?,
                "CLIENT_TIMEOUT_MS" => self.client_timeout_ms = parse_millis(key, value)?,
                _ => continue,
            }

            debug!(key = %key, "configuration overridden from environment");
        }
        Ok(())
    }

    /// Check that the values needed by the selected mode are usable.
    pub fn validate(&self) -> ConsentResult<()> {
        match self.mode {
            EngineMode::Server if self.connection_string.trim().is_empty() => {
                return Err(ConsentError::Config {
                    reason: "connection_string must not be empty in server mode".to_string(),
                });
            }
            EngineMode::Client if self.address.trim().is_empty() => {
                return Err(ConsentError::Config {
                    reason: "address must not be empty in client mode".to_string(),
                });
            }
            _ => {}
        }

        if self.busy_timeout_ms == 0 || self.client_timeout_ms == 0 {
            return Err(ConsentError::Config {
                reason: "timeouts must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> ConsentResult<u64> {
    value.trim().parse().map_err(|_| ConsentError::Config {
        reason: format!("{}{} must be a number of milliseconds, got '{}'", ENV_PREFIX, key, value),
    })
}
